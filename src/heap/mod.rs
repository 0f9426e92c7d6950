pub mod card_table;
pub mod nonmovable_allocator;
pub mod region;
pub mod region_allocator;
pub mod region_pool;
pub mod region_space;
pub mod remset;

pub use region::{Region, RegionFlags, RegionId};
pub use region_allocator::RegionAllocator;
pub use region_pool::RegionPool;
pub use region_space::{RegionSpace, SpaceKind};
