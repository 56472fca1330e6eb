// billing-backend/src/catalog/mod.rs
pub mod duration;
pub mod loader;
pub mod model;
pub mod versioned;
mod xml;

pub use duration::{add_duration, add_durations, add_or_remove_duration};
pub use loader::{CatalogLoader, XmlCatalogLoader};
pub use model::{
    BillingPeriod, Duration, PhaseType, Plan, PlanPhase, PlanPhaseSpecifier, PriceList, Product,
    ProductCategory, TimeUnit, DEFAULT_PRICE_LIST_NAME,
};
pub use versioned::{next_phase_transition, StandaloneCatalog, VersionedCatalog};
