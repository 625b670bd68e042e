//! # Communities
//!
//! Organizations, their membership and the role resolver.
//!
//! ## Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         COMMUNITY MODULE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  roles.rs    MemberRole, Permissions (role_for, can_manage_*)           │
//! │  service.rs  CommunityService: create / get / update / verify           │
//! │  members.rs  follow, unfollow, set role, remove, transfer ownership     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod members;
mod roles;
mod service;

pub use members::MemberView;
pub use roles::{MemberRole, Permissions};
pub use service::{CommunityService, NewOrganization, OrgType, OrganizationUpdate};

pub(crate) use service::validate_http_url;
