// partition.rs — How the output index space is divided among workers.
//
// The valid output region is rows × cols = [0, H-3] × [0, W-3]. Every
// strategy below covers it exactly once, with disjoint write ranges; they
// differ only in who claims which piece and when.
//
//   Sequential    one worker, whole region                 (baseline)
//   StaticRows    N contiguous row blocks, fixed up front   (omp for schedule(static))
//   DynamicRows   row chunks of `row_grain`, claimed on demand by a work-stealing pool
//   NestedRowCol  row blocks per team (outer) × column tiles per worker (inner)
//
// Disjointness is not a convention: the host engine turns each row range
// into its own `&mut [u8]` through `split_rows_mut`, which is built on
// `split_at_mut`, so two workers cannot even name the same output byte.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::error::{Result, SobelError};
use crate::kernel::WINDOW;

/// Partitioning scheme for the output index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartitionStrategy {
    /// Single-threaded row-major sweep on the calling thread.
    Sequential,
    /// Equal contiguous row blocks, one per worker, assigned before execution.
    #[default]
    StaticRows,
    /// Row chunks claimed by worker groups on demand.
    DynamicRows,
    /// Outer row blocks per team, inner column tiles per worker.
    NestedRowCol,
}

impl PartitionStrategy {
    pub const ALL: [PartitionStrategy; 4] = [
        PartitionStrategy::Sequential,
        PartitionStrategy::StaticRows,
        PartitionStrategy::DynamicRows,
        PartitionStrategy::NestedRowCol,
    ];

    /// Strategies that expose parallelism (the ones the device backend accepts).
    pub const PARALLEL: [PartitionStrategy; 3] = [
        PartitionStrategy::StaticRows,
        PartitionStrategy::DynamicRows,
        PartitionStrategy::NestedRowCol,
    ];

    pub fn is_parallel(self) -> bool {
        self != PartitionStrategy::Sequential
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PartitionStrategy::Sequential => "sequential",
            PartitionStrategy::StaticRows => "static",
            PartitionStrategy::DynamicRows => "dynamic",
            PartitionStrategy::NestedRowCol => "nested",
        };
        f.write_str(s)
    }
}

impl FromStr for PartitionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(PartitionStrategy::Sequential),
            "static" | "static-row" => Ok(PartitionStrategy::StaticRows),
            "dynamic" | "dynamic-row" | "teams" => Ok(PartitionStrategy::DynamicRows),
            "nested" | "nested-row-col" => Ok(PartitionStrategy::NestedRowCol),
            other => Err(format!(
                "unknown partition strategy '{other}' (expected sequential|static|dynamic|nested)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Valid region
// ---------------------------------------------------------------------------

/// The set of output indices the kernel can be evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRegion {
    /// Number of output rows written: `height - 2`.
    pub rows: usize,
    /// Number of output columns written per row: `width - 2`.
    pub cols: usize,
}

impl ValidRegion {
    /// Compute the region for a `width × height` raster.
    ///
    /// # Errors
    /// `InvalidDimensions` if either side is shorter than the 3×3 window.
    pub fn of(width: usize, height: usize) -> Result<Self> {
        if width < WINDOW || height < WINDOW {
            return Err(SobelError::InvalidDimensions { width, height });
        }
        Ok(ValidRegion {
            rows: height - (WINDOW - 1),
            cols: width - (WINDOW - 1),
        })
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }
}

// ---------------------------------------------------------------------------
// Block helpers
// ---------------------------------------------------------------------------

/// Split `0..len` into at most `parts` contiguous blocks whose sizes differ
/// by at most one (the first `len % parts` blocks are one longer).
///
/// Returns no blocks for `len == 0`; `parts == 0` is treated as 1.
pub fn static_blocks(len: usize, parts: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, len);
    let base = len / parts;
    let extra = len % parts;
    let mut blocks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        blocks.push(start..start + size);
        start += size;
    }
    blocks
}

/// Split `0..len` into consecutive blocks of `size` (the last may be short).
/// `size == 0` is treated as 1.
pub fn fixed_blocks(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Carve `buf` (rows of `width` bytes) into one mutable slice per row block.
///
/// `blocks` must be contiguous, ascending and start at row 0, exactly
/// what `static_blocks` / `fixed_blocks` produce.
///
/// # Panics
/// Panics if the blocks are not contiguous or run past the end of `buf`.
pub fn split_rows_mut<'a>(
    buf: &'a mut [u8],
    width: usize,
    blocks: &[Range<usize>],
) -> Vec<(Range<usize>, &'a mut [u8])> {
    let mut out = Vec::with_capacity(blocks.len());
    let mut rest = buf;
    let mut next_row = 0;
    for block in blocks {
        assert_eq!(block.start, next_row, "row blocks must be contiguous");
        let (head, tail) = rest.split_at_mut(block.len() * width);
        out.push((block.clone(), head));
        rest = tail;
        next_row = block.end;
    }
    out
}

// ---------------------------------------------------------------------------
// Work-item description
// ---------------------------------------------------------------------------

/// Who executes a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Fixed worker index, decided before execution.
    Worker(usize),
    /// Any idle worker of the pool, decided at run time.
    OnDemand,
    /// A worker inside team `t`; the team is fixed, the worker is not.
    Team(usize),
}

/// One rectangle of the output region and its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub owner: Owner,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

/// Tunables that shape the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionParams {
    /// Workers for `StaticRows` (one block each).
    pub workers: usize,
    /// Coarse groups for the outer level of `NestedRowCol`.
    pub teams: usize,
    /// Rows claimed per request under `DynamicRows`.
    pub row_grain: usize,
    /// Columns per inner task under `NestedRowCol`.
    pub column_tile: usize,
}

impl Default for PartitionParams {
    fn default() -> Self {
        PartitionParams {
            workers: 4,
            teams: 4,
            row_grain: 1,
            column_tile: 256,
        }
    }
}

/// Enumerate the work items a strategy produces for `region`.
///
/// This is the same decomposition the host executor uses to split the
/// destination buffer; it is exposed so callers (and tests) can inspect
/// the partition without running the kernel.
pub fn work_items(
    strategy: PartitionStrategy,
    region: ValidRegion,
    params: &PartitionParams,
) -> Vec<WorkItem> {
    let all_cols = 0..region.cols;
    match strategy {
        PartitionStrategy::Sequential => vec![WorkItem {
            owner: Owner::Worker(0),
            rows: 0..region.rows,
            cols: all_cols,
        }],
        PartitionStrategy::StaticRows => static_blocks(region.rows, params.workers)
            .into_iter()
            .enumerate()
            .map(|(i, rows)| WorkItem {
                owner: Owner::Worker(i),
                rows,
                cols: all_cols.clone(),
            })
            .collect(),
        PartitionStrategy::DynamicRows => fixed_blocks(region.rows, params.row_grain)
            .into_iter()
            .map(|rows| WorkItem {
                owner: Owner::OnDemand,
                rows,
                cols: all_cols.clone(),
            })
            .collect(),
        PartitionStrategy::NestedRowCol => {
            let tiles = fixed_blocks(region.cols, params.column_tile);
            let mut items = Vec::new();
            for (team, block) in static_blocks(region.rows, params.teams).into_iter().enumerate() {
                for row in block {
                    for cols in &tiles {
                        items.push(WorkItem {
                            owner: Owner::Team(team),
                            rows: row..row + 1,
                            cols: cols.clone(),
                        });
                    }
                }
            }
            items
        }
    }
}
