//! # Chunked Pass
//!
//! Runs a body over disjoint chunks of a row slice on the rayon pool, with
//! a scratch accumulator per worker that is merged after the join.

use rayon::prelude::*;

/// Per-worker accumulator for a pass.
///
/// `merge` must be associative: rayon reduces worker results in an
/// unspecified tree order.
pub trait Scratch: Default + Send {
    /// Combines two partial results into one.
    #[must_use]
    fn merge(self, other: Self) -> Self;
}

impl Scratch for () {
    fn merge(self, _other: Self) -> Self {}
}

impl Scratch for u32 {
    fn merge(self, other: Self) -> Self {
        self + other
    }
}

impl Scratch for usize {
    fn merge(self, other: Self) -> Self {
        self + other
    }
}

/// Configuration for a partitioned pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkedPass {
    /// Rows per chunk.
    chunk_size: usize,
    /// Below this many rows the pass runs on the calling thread.
    parallel_threshold: usize,
}

impl ChunkedPass {
    /// Creates a pass configuration.
    ///
    /// A zero chunk size is treated as one row per chunk.
    #[must_use]
    pub fn new(chunk_size: usize, parallel_threshold: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            parallel_threshold,
        }
    }

    /// Returns the chunk size.
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the row count at which the pass goes parallel.
    #[inline]
    #[must_use]
    pub const fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    /// Runs `body` over every chunk of `rows` and returns the merged scratch.
    ///
    /// `body` receives the worker's scratch, the chunk index and the chunk.
    /// Chunks are disjoint, so the body may freely mutate its rows. An empty
    /// slice skips the pass and returns `S::default()`.
    pub fn run<T, S, F>(&self, rows: &mut [T], body: F) -> S
    where
        T: Send,
        S: Scratch,
        F: Fn(&mut S, usize, &mut [T]) + Sync + Send,
    {
        if rows.is_empty() {
            return S::default();
        }

        if rows.len() < self.parallel_threshold {
            let mut scratch = S::default();
            for (index, chunk) in rows.chunks_mut(self.chunk_size).enumerate() {
                body(&mut scratch, index, chunk);
            }
            return scratch;
        }

        rows.par_chunks_mut(self.chunk_size)
            .enumerate()
            .fold(S::default, |mut scratch, (index, chunk)| {
                body(&mut scratch, index, chunk);
                scratch
            })
            .reduce(S::default, S::merge)
    }
}

impl Default for ChunkedPass {
    fn default() -> Self {
        Self::new(64, 256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MinMax {
        min: Option<u32>,
        max: Option<u32>,
        visited: usize,
    }

    impl Scratch for MinMax {
        fn merge(self, other: Self) -> Self {
            Self {
                min: match (self.min, other.min) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                },
                max: match (self.max, other.max) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                },
                visited: self.visited + other.visited,
            }
        }
    }

    fn run_min_max(pass: ChunkedPass, rows: &mut [u32]) -> MinMax {
        pass.run(rows, |scratch: &mut MinMax, _, chunk| {
            for row in chunk.iter_mut() {
                *row += 1;
                scratch.min = Some(scratch.min.map_or(*row, |m| m.min(*row)));
                scratch.max = Some(scratch.max.map_or(*row, |m| m.max(*row)));
                scratch.visited += 1;
            }
        })
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let mut small: Vec<u32> = (0..100).collect();
        let mut large: Vec<u32> = (0..100).collect();

        let sequential = run_min_max(ChunkedPass::new(8, usize::MAX), &mut small);
        let parallel = run_min_max(ChunkedPass::new(8, 0), &mut large);

        assert_eq!(small, large);
        assert_eq!(sequential.min, Some(1));
        assert_eq!(sequential.max, Some(100));
        assert_eq!(parallel.min, sequential.min);
        assert_eq!(parallel.max, sequential.max);
        assert_eq!(parallel.visited, 100);
    }

    #[test]
    fn test_every_row_visited_once() {
        let mut rows = vec![0u32; 10_000];
        let visited: usize = ChunkedPass::new(64, 0).run(&mut rows, |count: &mut usize, _, chunk| {
            for row in chunk.iter_mut() {
                *row += 1;
            }
            *count += chunk.len();
        });

        assert_eq!(visited, 10_000);
        assert!(rows.iter().all(|&r| r == 1));
    }

    #[test]
    fn test_empty_pass_is_skipped() {
        let mut rows: Vec<u32> = Vec::new();
        let visited: u32 = ChunkedPass::default().run(&mut rows, |count: &mut u32, _, _| {
            *count += 1;
        });
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let pass = ChunkedPass::new(0, 0);
        assert_eq!(pass.chunk_size(), 1);
    }
}
