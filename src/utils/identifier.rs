use uuid::Uuid;

/// Generates an opaque identifier for naming a stored file.
///
/// Random (v4) UUIDs carry 122 bits of randomness and encode neither the
/// upload order nor anything about the uploader.
pub fn generate() -> Uuid {
    Uuid::new_v4()
}
