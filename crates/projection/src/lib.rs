//! # Codecity Projection
//!
//! Pure, deterministic mapping from a correlated model to a "city".
//!
//! ```text
//! CorrelatedModel
//!     │
//!     ├──> FileFacts per file with ≥ 1 finding (counts, loc, debt, kinds)
//!     │
//!     └──> City
//!           ├── buildings  (height, condition, security, traffic, lot)
//!           ├── districts  (top-level directory; mode condition, worst security)
//!           ├── roads      (districts sharing a finding kind)
//!           └── overlays   (quality, security, complexity, technical-debt)
//! ```
//!
//! Buildings keep the facts they were derived from, so
//! `project_facts(&city.facts()) == city` for every projected city.

mod bands;
mod city;
mod facts;
mod overlay;

pub use bands::{building_height, severity_weight, Condition, SecurityLevel, Traffic};
pub use city::{project, project_facts, Building, City, District, Position, Road, LOT_SIZE, ROAD_WIDTH};
pub use facts::{collect_facts, district_key, FileFacts, BYTES_PER_LINE};
pub use overlay::{Band, Overlay, OverlayKind, OverlayReading};
