//! Random data generators for testing.
use rand::{thread_rng, Rng};

/// Returns a shared-file name like `file-1a2b3c4d.bin` that no other test
/// run is likely to have used.
///
/// Keeping names unique per run means a test hitting a real tracker folder
/// can never collide with a record left behind by an earlier failure.
pub fn file_name() -> String {
    let tag: u32 = thread_rng().gen();
    format!("file-{tag:08x}.bin")
}

/// Returns a buffer of `size` random bytes.
///
/// It is useful for generating shared-file content for testing.
pub fn bytes(size: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; size];
    thread_rng().fill(buffer.as_mut_slice());
    buffer
}
