// engine/host.rs — Host backend: rayon worker pool over host memory.
//
// Each strategy maps onto a different rayon construct:
//
//   Sequential    plain loop on the calling thread
//   StaticRows    pool.scope + one spawn per precomputed row block
//   DynamicRows   par_chunks_mut over `row_grain`-row chunks, one stealable
//                 task each (with_max_len(1))
//   NestedRowCol  outer par_iter over team row blocks, inner par_chunks_mut
//                 over column tiles of each row
//
// Every call returns only after all tasks have finished (scope / install
// are joins), which gives the engine its barrier semantics.

use std::ops::Range;

use rayon::prelude::*;

use crate::error::Result;
use crate::kernel::{convolve_span, NumericPolicy};
use crate::partition::{
    fixed_blocks, split_rows_mut, static_blocks, PartitionParams, PartitionStrategy, ValidRegion,
};
use crate::raster::RasterView;

/// Owns the worker pool used by every host run of an engine.
pub(crate) struct HostExecutor {
    pool: rayon::ThreadPool,
}

impl HostExecutor {
    /// `workers == 0` lets rayon pick (one thread per logical core).
    pub(crate) fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sobel-worker-{i}"))
            .build()?;
        Ok(HostExecutor { pool })
    }

    pub(crate) fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate the kernel over `region`, writing into `dst`.
    ///
    /// `dst` is the full `width * height` destination; only the first
    /// `region.cols` bytes of the first `region.rows` rows are written.
    /// The length is only debug-asserted: `Engine` validates the shape
    /// before calling in.
    pub(crate) fn execute(
        &self,
        src: RasterView<'_>,
        dst: &mut [u8],
        region: ValidRegion,
        strategy: PartitionStrategy,
        policy: NumericPolicy,
        params: &PartitionParams,
    ) {
        let width = src.width();
        debug_assert_eq!(dst.len(), width * src.height());
        let body = &mut dst[..region.rows * width];

        match strategy {
            PartitionStrategy::Sequential => {
                convolve_rows(src, 0..region.rows, body, region.cols, policy);
            }
            PartitionStrategy::StaticRows => {
                let blocks = static_blocks(region.rows, params.workers);
                log::debug!("static: {} row blocks over {} workers", blocks.len(), self.workers());
                let parts = split_rows_mut(body, width, &blocks);
                self.pool.scope(|s| {
                    for (rows, chunk) in parts {
                        s.spawn(move |_| convolve_rows(src, rows, chunk, region.cols, policy));
                    }
                });
            }
            PartitionStrategy::DynamicRows => {
                // Bounded by the row count so `width * grain` cannot overflow.
                let grain = params.row_grain.clamp(1, region.rows.max(1));
                log::debug!("dynamic: chunks of {grain} rows");
                self.pool.install(|| {
                    body.par_chunks_mut(width * grain)
                        .with_max_len(1)
                        .enumerate()
                        .for_each(|(i, chunk)| {
                            let start = i * grain;
                            let rows = start..start + chunk.len() / width;
                            convolve_rows(src, rows, chunk, region.cols, policy);
                        });
                });
            }
            PartitionStrategy::NestedRowCol => {
                let blocks = static_blocks(region.rows, params.teams);
                let tile = params.column_tile.max(1);
                log::debug!(
                    "nested: {} teams, column tiles of {tile} ({} per row)",
                    blocks.len(),
                    fixed_blocks(region.cols, tile).len()
                );
                let parts = split_rows_mut(body, width, &blocks);
                self.pool.install(|| {
                    parts
                        .into_par_iter()
                        .with_max_len(1)
                        .for_each(|(rows, chunk)| {
                            for (row, line) in rows.zip(chunk.chunks_exact_mut(width)) {
                                line[..region.cols]
                                    .par_chunks_mut(tile)
                                    .enumerate()
                                    .for_each(|(t, seg)| {
                                        let c0 = t * tile;
                                        convolve_span(&src, row, c0..c0 + seg.len(), seg, policy);
                                    });
                            }
                        });
                });
            }
        }
    }
}

/// Sweep a block of rows; `chunk` holds exactly those rows of the destination.
fn convolve_rows(
    src: RasterView<'_>,
    rows: Range<usize>,
    chunk: &mut [u8],
    cols: usize,
    policy: NumericPolicy,
) {
    let width = src.width();
    for (row, line) in rows.zip(chunk.chunks_exact_mut(width)) {
        convolve_span(&src, row, 0..cols, &mut line[..cols], policy);
    }
}
