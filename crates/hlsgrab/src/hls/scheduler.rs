// HLS Segment Scheduler: Fills a task's slot array with bounded concurrency.

use bytes::Bytes;
use futures::future::try_join_all;
use tracing::{debug, error};

use crate::error::TaskError;
use crate::hls::fetcher::SegmentFetcher;
use crate::hls::playlist::SegmentDescriptor;
use crate::task::TaskControl;

/// Segments per worker: `ceil(total / max_concurrent)`, at least one.
pub fn chunk_size(total: usize, max_concurrent: usize) -> usize {
    total.div_ceil(max_concurrent.max(1)).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Every slot was written.
    Completed,
    /// A pause or cancel stopped scheduling before all slots were written.
    Interrupted,
}

/// Splits the segment list into contiguous ranges, one worker per range.
///
/// Each worker owns the matching `&mut` sub-slice of the slot array and fetches its
/// range in increasing index order, so slots need no locking and every slot has
/// exactly one writer.
pub struct SegmentScheduler<'a> {
    fetcher: &'a SegmentFetcher,
    control: &'a TaskControl,
    max_concurrent: usize,
}

impl<'a> SegmentScheduler<'a> {
    pub fn new(fetcher: &'a SegmentFetcher, control: &'a TaskControl, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            control,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetch every segment into `slots[index]`, calling `on_filled` after each write.
    ///
    /// The first failing segment aborts the run; the remaining workers are dropped.
    pub async fn run(
        &self,
        segments: &[SegmentDescriptor],
        slots: &mut [Option<Bytes>],
        on_filled: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<ScheduleOutcome, TaskError> {
        debug_assert_eq!(segments.len(), slots.len());
        if segments.is_empty() {
            return Ok(ScheduleOutcome::Completed);
        }

        let chunk = chunk_size(segments.len(), self.max_concurrent);
        debug!(
            segments = segments.len(),
            workers = segments.len().div_ceil(chunk),
            chunk,
            "Scheduling segment workers"
        );

        let workers = segments
            .chunks(chunk)
            .zip(slots.chunks_mut(chunk))
            .enumerate()
            .map(|(worker, (range, range_slots))| {
                self.run_worker(worker, range, range_slots, on_filled)
            });

        let outcomes = try_join_all(workers).await?;
        if outcomes.iter().all(|o| *o == ScheduleOutcome::Completed) {
            Ok(ScheduleOutcome::Completed)
        } else {
            Ok(ScheduleOutcome::Interrupted)
        }
    }

    async fn run_worker(
        &self,
        worker: usize,
        segments: &[SegmentDescriptor],
        slots: &mut [Option<Bytes>],
        on_filled: &(dyn Fn(usize) + Send + Sync),
    ) -> Result<ScheduleOutcome, TaskError> {
        for (segment, slot) in segments.iter().zip(slots.iter_mut()) {
            if self.control.should_stop() {
                debug!(worker, index = segment.index, "Worker stopped before fetch");
                return Ok(ScheduleOutcome::Interrupted);
            }

            let result = self.fetcher.fetch_segment(segment).await;

            // Results arriving after a pause or cancel are dropped, failures included.
            if self.control.should_stop() {
                debug!(worker, index = segment.index, "Discarding late segment result");
                return Ok(ScheduleOutcome::Interrupted);
            }

            match result {
                Ok(data) => {
                    *slot = Some(data);
                    on_filled(segment.index);
                }
                Err(source) => {
                    error!(
                        worker,
                        index = segment.index,
                        url = %segment.url,
                        error = %source,
                        "Segment fetch failed"
                    );
                    return Err(TaskError::Segment {
                        index: segment.index,
                        source,
                    });
                }
            }
        }
        Ok(ScheduleOutcome::Completed)
    }
}
