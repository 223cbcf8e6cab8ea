//! Domain model (ids, sources, inputs, jobs, descriptors, outcomes, errors).

pub mod decision;
pub mod errors;
pub mod ids;
pub mod inputs;
pub mod job;
pub mod outcome;
pub mod source;
pub mod task;

pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{CollectorError, ErrorKind, PersonaError};
pub use ids::{JobId, TaskId};
pub use inputs::JobInputs;
pub use job::{CompletionPolicy, Job, JobDataRecord, JobStatus, SourceOutcome};
pub use outcome::{CollectorOutcome, ReportDisposition};
pub use source::Source;
pub use task::TaskDescriptor;
