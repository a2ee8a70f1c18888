//! Port allocation
//!
//! Static worktrees keep hand-picked offsets; ephemeral branch worktrees draw
//! hash-seeded slots from a reserved range so that every concrete port
//! (`base + offset`) stays unique across live worktrees.

mod allocator;
mod assignment;

pub use allocator::{PortAllocator, PortError, SlotRange, UsedOffsetSet, base_slot};
pub use assignment::{
    BASE_PORT_API, BASE_PORT_DB, BASE_PORT_INBUCKET, BASE_PORT_NEXTJS, BASE_PORT_POOLER, BASE_PORT_POP3,
    BASE_PORT_SHADOW, BASE_PORT_SMTP, PortAssignment, branch_to_project_id,
};
