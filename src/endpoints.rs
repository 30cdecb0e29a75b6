//! The content platform's endpoint catalogue.
//!
//! Paths are relative to the API base URL and keep the server's trailing
//! slashes. Reads provide and writes invalidate the tags listed next to them;
//! changing a tag here changes what gets refetched after a write.

use serde_json::{Value, json};

use crate::error::QueryError;
use crate::reaction;
use crate::registry::{
    EndpointDescriptor, Method, Registry, RequestSpec, arg_id, arg_str, id_of,
};
use crate::tag::{ResourceCategory, Tag};

use ResourceCategory::{Category, Comment, Content, Notification, Profile, Stats, User};

/// Endpoint names, as passed to [`ApiClient::query`](crate::client::ApiClient::query)
/// and [`ApiClient::mutate`](crate::client::ApiClient::mutate).
pub mod names {
    pub const LOGIN: &str = "login";
    pub const REGISTER: &str = "register";
    pub const FORGOT_PASSWORD: &str = "forgot_password";
    pub const VERIFY_EMAIL: &str = "verify_email";
    pub const VERIFY_EMAIL_GET: &str = "verify_email_get";
    pub const RESET_PASSWORD: &str = "reset_password";
    pub const CHANGE_PASSWORD: &str = "change_password";
    pub const CURRENT_USER: &str = "current_user";

    pub const GET_PROFILE: &str = "get_profile";
    pub const UPDATE_PROFILE: &str = "update_profile";
    pub const GET_STATS: &str = "get_stats";

    pub const LIST_CONTENT: &str = "list_content";
    pub const GET_CONTENT: &str = "get_content";
    pub const CREATE_CONTENT: &str = "create_content";
    pub const UPDATE_CONTENT: &str = "update_content";
    pub const DELETE_CONTENT: &str = "delete_content";
    pub const UPLOAD_CONTENT_MEDIA: &str = "upload_content_media";
    pub const APPROVE_CONTENT: &str = "approve_content";
    pub const FLAG_CONTENT: &str = "flag_content";
    pub const ADD_TO_CONTENT: &str = "add_to_content";

    pub const GET_CATEGORIES: &str = "get_categories";
    pub const CREATE_CATEGORY: &str = "create_category";
    pub const UPDATE_DELETE_CATEGORY: &str = "update_delete_category";
    pub const DELETE_CATEGORY: &str = "delete_category";

    pub const TOGGLE_REACTION: &str = "toggle_reaction";
    pub const GET_ALL_REACTIONS: &str = "get_all_reactions";
    pub const DELETE_REACTION: &str = "delete_reaction";

    pub const GET_COMMENTS: &str = "get_comments";
    pub const ADD_COMMENT: &str = "add_comment";
    pub const DELETE_COMMENT: &str = "delete_comment";
    pub const APPROVE_COMMENT: &str = "approve_comment";

    pub const GET_NOTIFICATIONS: &str = "get_notifications";
    pub const MARK_NOTIFICATION_READ: &str = "mark_notification_read";
    pub const MARK_ALL_NOTIFICATIONS_READ: &str = "mark_all_notifications_read";
    pub const DELETE_NOTIFICATION: &str = "delete_notification";

    pub const GET_DASHBOARD_STATS: &str = "get_dashboard_stats";
    pub const GET_USERS: &str = "get_users";
    pub const GET_USER: &str = "get_user";
    pub const UPDATE_USER_ROLE: &str = "update_user_role";
    pub const GET_ALL_COMMENTS: &str = "get_all_comments";
    pub const GET_ALL_NOTIFICATIONS: &str = "get_all_notifications";
    pub const MOST_ACTIVE_USERS: &str = "most_active_users";
    pub const TRENDING_CONTENT: &str = "trending_content";
}

use names::*;

/// Builds the registry holding every platform endpoint.
pub fn content_platform() -> Result<Registry, QueryError> {
    let registry = Registry::new();
    for descriptor in catalogue() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

fn tags(categories: &[ResourceCategory]) -> Vec<Tag> {
    categories.iter().copied().map(Tag::category).collect()
}

/// Provides `Content` plus `Content:{id}` for every item of a list or page.
fn content_list_tags(result: &Value) -> Vec<Tag> {
    let items = match result {
        Value::Array(items) => Some(items),
        Value::Object(page) => page.get("results").and_then(Value::as_array),
        _ => None,
    };
    let mut provided = vec![Tag::category(Content)];
    provided.extend(
        items
            .into_iter()
            .flatten()
            .filter_map(|item| item.get("id").and_then(id_of))
            .map(|id| Tag::instance(Content, id)),
    );
    provided
}

fn body_or_empty(args: &Value, field: &str) -> Value {
    args.get(field).cloned().unwrap_or_else(|| json!({}))
}

fn catalogue() -> Vec<EndpointDescriptor> {
    vec![
        // auth
        EndpointDescriptor::mutation(LOGIN, |args| {
            Ok(RequestSpec::new(Method::Post, "auth/login/").with_body(args.clone()))
        })
        .invalidates(|_, _| tags(&[User])),
        EndpointDescriptor::mutation(REGISTER, |args| {
            Ok(RequestSpec::new(Method::Post, "auth/register/").with_body(args.clone()))
        })
        .invalidates(|_, _| tags(&[User])),
        EndpointDescriptor::mutation(FORGOT_PASSWORD, |args| {
            Ok(RequestSpec::new(Method::Post, "auth/request-password-reset/").with_body(args.clone()))
        }),
        EndpointDescriptor::mutation(VERIFY_EMAIL, |args| {
            let body = json!({
                "uid": arg_str(args, "uid"),
                "token": arg_str(args, "token"),
            });
            Ok(RequestSpec::new(Method::Post, "auth/verify-email/").with_body(body))
        }),
        // Link-style verification, as opened from the email.
        EndpointDescriptor::query(VERIFY_EMAIL_GET, |args| {
            Ok(RequestSpec::get("auth/verify-email/")
                .with_query("uid", arg_str(args, "uid"))
                .with_query("token", arg_str(args, "token")))
        }),
        EndpointDescriptor::mutation(RESET_PASSWORD, |args| {
            Ok(RequestSpec::new(Method::Post, "auth/reset-password/").with_body(args.clone()))
        }),
        EndpointDescriptor::mutation(CHANGE_PASSWORD, |args| {
            Ok(RequestSpec::new(Method::Post, "auth/change-password/").with_body(args.clone()))
        }),
        EndpointDescriptor::query(CURRENT_USER, |_| Ok(RequestSpec::get("auth/current-user/")))
            .provides(|_, _| tags(&[User])),
        // profile
        EndpointDescriptor::query(GET_PROFILE, |_| Ok(RequestSpec::get("profile/")))
            .provides(|_, _| tags(&[Profile])),
        EndpointDescriptor::mutation(UPDATE_PROFILE, |args| {
            Ok(RequestSpec::new(Method::Patch, "profile/update/").with_body(args.clone()))
        })
        .invalidates(|_, _| tags(&[Profile])),
        EndpointDescriptor::query(GET_STATS, |_| Ok(RequestSpec::get("stats/")))
            .provides(|_, _| tags(&[Stats])),
        // content
        EndpointDescriptor::query(LIST_CONTENT, |args| {
            Ok(RequestSpec::get("content/")
                .with_query("page", arg_str(args, "page"))
                .with_query("category", arg_str(args, "category"))
                .with_query("search", arg_str(args, "search"))
                .with_query("tag", arg_str(args, "tag")))
        })
        .provides(|_, result| content_list_tags(result)),
        EndpointDescriptor::query(GET_CONTENT, |args| {
            let id = arg_id(GET_CONTENT, args, "id")?;
            Ok(RequestSpec::get(format!("content/{id}/")))
        })
        .provides(|args, _| {
            args.get("id")
                .and_then(id_of)
                .map(|id| vec![Tag::instance(Content, id)])
                .unwrap_or_default()
        }),
        EndpointDescriptor::mutation(CREATE_CONTENT, |args| {
            Ok(RequestSpec::new(Method::Post, "content/create/").with_body(args.clone()))
        })
        .invalidates(|_, _| tags(&[Content])),
        EndpointDescriptor::mutation(UPDATE_CONTENT, |args| {
            let id = arg_id(UPDATE_CONTENT, args, "id")?;
            Ok(RequestSpec::new(Method::Put, format!("content/{id}/update/"))
                .with_body(body_or_empty(args, "data")))
        })
        .invalidates(|_, _| tags(&[Content])),
        EndpointDescriptor::mutation(DELETE_CONTENT, |args| {
            let id = arg_id(DELETE_CONTENT, args, "id")?;
            Ok(RequestSpec::new(Method::Delete, format!("content/{id}/delete/")))
        })
        .invalidates(|_, _| tags(&[Content])),
        EndpointDescriptor::mutation(UPLOAD_CONTENT_MEDIA, |args| {
            Ok(RequestSpec::new(Method::Post, "content/media/upload/").with_body(args.clone()))
        })
        .invalidates(|_, _| tags(&[Content])),
        EndpointDescriptor::mutation(APPROVE_CONTENT, |args| {
            let id = arg_id(APPROVE_CONTENT, args, "id")?;
            Ok(RequestSpec::new(Method::Post, format!("content/{id}/approve/")))
        })
        .invalidates(|_, _| tags(&[Content])),
        EndpointDescriptor::mutation(FLAG_CONTENT, |args| {
            let id = arg_id(FLAG_CONTENT, args, "id")?;
            Ok(RequestSpec::new(Method::Post, format!("content/{id}/flag/")))
        })
        .invalidates(|_, _| tags(&[Content])),
        EndpointDescriptor::mutation(ADD_TO_CONTENT, |args| {
            let id = arg_id(ADD_TO_CONTENT, args, "id")?;
            let body = json!({ "content": args.get("content").cloned().unwrap_or(Value::Null) });
            Ok(RequestSpec::new(Method::Post, format!("content/{id}/add-to-content/"))
                .with_body(body))
        })
        .invalidates(|_, _| tags(&[Content])),
        // categories
        EndpointDescriptor::query(GET_CATEGORIES, |_| Ok(RequestSpec::get("categories/")))
            .provides(|_, _| tags(&[Category])),
        EndpointDescriptor::mutation(CREATE_CATEGORY, |args| {
            Ok(RequestSpec::new(Method::Post, "categories/create/").with_body(args.clone()))
        })
        .invalidates(|_, _| tags(&[Category])),
        EndpointDescriptor::mutation(UPDATE_DELETE_CATEGORY, |args| {
            let id = arg_id(UPDATE_DELETE_CATEGORY, args, "id")?;
            let method = match arg_str(args, "method").to_ascii_uppercase().as_str() {
                "DELETE" => Method::Delete,
                "PATCH" => Method::Patch,
                _ => Method::Put,
            };
            let spec = RequestSpec::new(method, format!("categories/{id}/update-delete/"));
            Ok(match args.get("data") {
                Some(data) => spec.with_body(data.clone()),
                None => spec,
            })
        })
        .invalidates(|_, _| tags(&[Category])),
        EndpointDescriptor::mutation(DELETE_CATEGORY, |args| {
            let id = arg_id(DELETE_CATEGORY, args, "id")?;
            Ok(RequestSpec::new(Method::Delete, format!("admin/categories/{id}/")))
        })
        .invalidates(|_, _| tags(&[Category])),
        // reactions
        EndpointDescriptor::mutation(TOGGLE_REACTION, |args| {
            let id = arg_id(TOGGLE_REACTION, args, "id")?;
            let reaction_type = arg_str(args, "reaction_type");
            if reaction::ReactionType::parse(&reaction_type).is_none() {
                return Err(QueryError::InvalidArgs {
                    endpoint: TOGGLE_REACTION.to_string(),
                    reason: format!("unknown reaction type `{reaction_type}`"),
                });
            }
            Ok(RequestSpec::new(Method::Post, format!("content/{id}/reactions/toggle/"))
                .with_body(json!({ "reaction_type": reaction_type })))
        })
        .invalidates(|_, _| tags(&[Content]))
        .optimistic(reaction::toggle_policy()),
        EndpointDescriptor::query(GET_ALL_REACTIONS, |_| Ok(RequestSpec::get("admin/reactions/"))),
        EndpointDescriptor::mutation(DELETE_REACTION, |args| {
            let id = arg_id(DELETE_REACTION, args, "id")?;
            Ok(RequestSpec::new(Method::Delete, format!("admin/reactions/{id}/")))
        }),
        // comments
        EndpointDescriptor::query(GET_COMMENTS, |args| {
            let id = arg_id(GET_COMMENTS, args, "content_id")?;
            Ok(RequestSpec::get(format!("content/{id}/comments/")))
        })
        .provides(|_, _| tags(&[Comment])),
        EndpointDescriptor::mutation(ADD_COMMENT, |args| {
            let id = arg_id(ADD_COMMENT, args, "content_id")?;
            Ok(RequestSpec::new(Method::Post, format!("content/{id}/comments/add/"))
                .with_body(json!({ "content": arg_str(args, "content") })))
        })
        .invalidates(|_, _| tags(&[Comment, Content])),
        EndpointDescriptor::mutation(DELETE_COMMENT, |args| {
            let content_id = arg_id(DELETE_COMMENT, args, "content_id")?;
            let id = arg_id(DELETE_COMMENT, args, "id")?;
            Ok(RequestSpec::new(
                Method::Delete,
                format!("content/{content_id}/comments/{id}/delete/"),
            ))
        })
        .invalidates(|_, _| tags(&[Comment, Content])),
        EndpointDescriptor::mutation(APPROVE_COMMENT, |args| {
            let id = arg_id(APPROVE_COMMENT, args, "id")?;
            Ok(RequestSpec::new(Method::Post, format!("comments/{id}/approve/")))
        })
        .invalidates(|_, _| tags(&[Comment])),
        // notifications
        EndpointDescriptor::query(GET_NOTIFICATIONS, |_| Ok(RequestSpec::get("notifications/")))
            .provides(|_, _| tags(&[Notification])),
        EndpointDescriptor::mutation(MARK_NOTIFICATION_READ, |args| {
            let id = arg_id(MARK_NOTIFICATION_READ, args, "id")?;
            Ok(RequestSpec::new(Method::Post, format!("notifications/{id}/mark-read/")))
        })
        .invalidates(|_, _| tags(&[Notification])),
        EndpointDescriptor::mutation(MARK_ALL_NOTIFICATIONS_READ, |_| {
            Ok(RequestSpec::new(Method::Post, "notifications/mark-all-read/"))
        })
        .invalidates(|_, _| tags(&[Notification])),
        EndpointDescriptor::mutation(DELETE_NOTIFICATION, |args| {
            let id = arg_id(DELETE_NOTIFICATION, args, "id")?;
            Ok(RequestSpec::new(Method::Delete, format!("notifications/{id}/delete/")))
        })
        .invalidates(|_, _| tags(&[Notification])),
        // admin
        EndpointDescriptor::query(GET_DASHBOARD_STATS, |_| Ok(RequestSpec::get("admin/dashboard/")))
            .provides(|_, _| tags(&[Stats])),
        EndpointDescriptor::query(GET_USERS, |_| Ok(RequestSpec::get("admin/users/")))
            .provides(|_, _| tags(&[User])),
        EndpointDescriptor::query(GET_USER, |args| {
            let id = arg_id(GET_USER, args, "id")?;
            Ok(RequestSpec::get(format!("admin/users/{id}/")))
        })
        .provides(|_, _| tags(&[User])),
        EndpointDescriptor::mutation(UPDATE_USER_ROLE, |args| {
            let id = arg_id(UPDATE_USER_ROLE, args, "id")?;
            Ok(RequestSpec::new(Method::Post, format!("admin/users/{id}/update-role/"))
                .with_body(json!({ "role": arg_str(args, "role") })))
        })
        .invalidates(|_, _| tags(&[User])),
        EndpointDescriptor::query(GET_ALL_COMMENTS, |_| Ok(RequestSpec::get("admin/comments/")))
            .provides(|_, _| tags(&[Comment])),
        EndpointDescriptor::query(GET_ALL_NOTIFICATIONS, |_| {
            Ok(RequestSpec::get("admin/notifications/"))
        })
        .provides(|_, _| tags(&[Notification])),
        EndpointDescriptor::query(MOST_ACTIVE_USERS, |_| {
            Ok(RequestSpec::get("admin/most-active-users/"))
        })
        .provides(|_, _| tags(&[User])),
        EndpointDescriptor::query(TRENDING_CONTENT, |_| Ok(RequestSpec::get("admin/trending-content/")))
            .provides(|_, result| content_list_tags(result)),
    ]
}
