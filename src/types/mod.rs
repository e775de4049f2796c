// ABOUTME: Type-safe identifiers and validated domain values.
// ABOUTME: Uses phantom types to prevent name confusion at compile time.

mod application_id;
mod id;
mod job_type;
mod revision;
mod version;
mod zone;

pub use application_id::{ApplicationId, ParseApplicationIdError, TenantAndApplicationId};
pub use id::{ApplicationName, InstanceName, NameError, RegionName, TenantName};
pub use job_type::{JobId, JobType};
pub use revision::{ApplicationVersion, RevisionId, SourceRevision};
pub use version::{ParseVersionError, Version};
pub use zone::{Environment, ZoneId};
