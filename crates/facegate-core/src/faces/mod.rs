pub mod enrollment;
pub mod extractor;
pub mod gate;
pub mod matcher;
pub mod repository;
pub mod store;
pub mod vector;

pub use enrollment::{
    enroll_identity, load_store, rebuild_store, remove_identity, validate_identity,
    EnrollmentMode, EnrollmentOutcome, EnrollmentRecord, EnrollmentRequest, RebuildOutcome,
    RemovalOutcome,
};
pub use extractor::{
    select_primary_face, BoundingBox, EmbeddingExtractor, FaceDetection, FeatureFile,
    FeatureFileExtractor,
};
pub use gate::{evaluate, to_percentage, GateDecision, DEFAULT_THRESHOLD};
pub use matcher::{cosine_similarity, MatchCandidate, SimilarityMatcher, DEFAULT_CANDIDATE_LIMIT};
pub use repository::{
    EnrollmentRepository, FilesystemEnrollmentRepository, MemoryEnrollmentRepository,
};
pub use store::{EmbeddingStore, EnrollmentEntry, EnrollmentSnapshot, StoreStats};
pub use vector::EmbeddingVector;
