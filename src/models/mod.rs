pub mod diagnostic;
pub mod dump;
pub mod index;
pub mod job;
pub mod location;
pub mod repository;
pub mod upload;

pub use diagnostic::{Diagnostic, RawDiagnostic, Severity};
pub use dump::Dump;
pub use index::{Index, IndexFilter};
pub use job::JobState;
pub use location::{ItemKind, Located, Location, Position, Range};
pub use repository::Repository;
pub use upload::{NewUpload, Upload, UploadFilter};
