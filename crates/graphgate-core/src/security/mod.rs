//! Request identity, roles, and per-role authorization profiles.

mod context;
mod filter_expr;
mod profile;
mod role;

pub use context::RequestContext;
pub use filter_expr::{CompareOp, Operand, RowFilter};
pub use profile::{
    AuthorizationProfiles, DeleteProfile, MutationProfile, OperationKind, QueryProfile, QueryType,
    TableProfile,
};
pub use role::{Role, RoleResolver};
