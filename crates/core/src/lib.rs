pub mod collect;
pub mod config;
pub mod dom;
pub mod driver;
pub mod error;
pub mod events;
pub mod extract;
pub mod gates;
pub mod harvest;
pub mod sink;

pub use collect::{group_by_entity, EntityGroup, LinkCollector, LinkPair};
pub use config::{Credentials, ScoutConfig};
pub use driver::{Driver, DriverFactory, Locator, StaticDriver};
pub use error::{ConfigError, DriverError, SinkError};
pub use events::{Event, EventSink, MemorySink, TracingSink};
pub use extract::NOT_AVAILABLE;
pub use harvest::{harvest, harvest_parallel, DetailRecord, HarvestContext, HarvestReport, Harvester};
pub use sink::{write_records, write_records_file, SnapshotDir, SnapshotWriter};
