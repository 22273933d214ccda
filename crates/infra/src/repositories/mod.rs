mod memory;
mod surreal;

pub use memory::InMemoryCommunityStore;
pub use surreal::SurrealCommunityStore;
