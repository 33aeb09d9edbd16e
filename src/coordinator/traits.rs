/*!
 * Coordinator Traits
 * Seams between the coordinator and the primitives it tracks
 */

/// A primitive that can be forcibly opened when free mode starts
///
/// Implemented by monitored semaphores. The coordinator only holds weak
/// references to targets and calls `open` without holding its own lock.
pub trait FreeModeTarget: Send + Sync {
    /// Release until the primitive no longer blocks, returning how many
    /// releases were needed
    fn open(&self) -> usize;
}
