// NAry merge: one bounded top-k heap per input strand, fanned out onto
// its own thread, then merged into a single bounded heap.
//
// Uses a bounded-heap eviction pattern (push while under capacity, else
// compare-and-replace against the worst kept row) applied twice: once
// per strand, concurrently, and once more over the strands' results.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::execution::logical::SortKey;
use crate::value::{BindingContext, ColumnDef, Record};

use super::{compare_rows, Operator};

/// `compare_rows` plus a strand-id tiebreak, for the one place (the
/// final cross-strand merge) where two different strands can otherwise
/// tie on both `sort_on` and `tuple_id` — each strand's `tuple_id`s are
/// only unique within that strand's own source.
fn compare_with_strand(sort_on: &[SortKey], a: &Record, a_strand: usize, b: &Record, b_strand: usize) -> Ordering {
    let primary = compare_rows(sort_on, a, b);
    if primary != Ordering::Equal {
        primary
    } else {
        a_strand.cmp(&b_strand)
    }
}

struct HeapEntry {
    record: Record,
    strand: usize,
    sort_on: Arc<Vec<SortKey>>,
}

/// `BinaryHeap` is a max-heap, so `HeapEntry`'s `Ord` deliberately tracks
/// `compare_with_strand` as-is: a row that sorts later ("worse") compares
/// as `Greater`, which is exactly the row a bounded top-k wants sitting
/// at the heap's root, ready to be evicted the moment a better one
/// arrives.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_with_strand(&self.sort_on, &self.record, self.strand, &other.record, other.strand)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Drains `input` fully, keeping only the `limit` best rows by
/// `sort_on`, using the same bounded-heap eviction pattern. Each
/// strand gets its own fresh `BindingContext` so the strand identity
/// doesn't leak into the per-row predicates it runs through.
fn drain_strand_top_k(
    strand: usize,
    mut input: Box<dyn Operator>,
    sort_on: Arc<Vec<SortKey>>,
    limit: usize,
) -> Result<Vec<Record>> {
    let mut heap: std::collections::BinaryHeap<HeapEntry> = std::collections::BinaryHeap::with_capacity(limit.min(1024));
    let mut ctx = BindingContext::new();
    while let Some(record) = input.next(&mut ctx)? {
        if limit == 0 {
            continue;
        }
        if heap.len() < limit {
            heap.push(HeapEntry {
                record,
                strand,
                sort_on: Arc::clone(&sort_on),
            });
        } else if let Some(worst) = heap.peek() {
            if compare_with_strand(&sort_on, &record, strand, &worst.record, worst.strand) == Ordering::Less {
                heap.pop();
                heap.push(HeapEntry {
                    record,
                    strand,
                    sort_on: Arc::clone(&sort_on),
                });
            }
        }
    }
    input.close();
    Ok(heap.into_sorted_vec().into_iter().map(|e| e.record).collect())
}

/// `MergeLimitingSortPhysicalOperatorNode`'s runtime counterpart: a
/// `PipelineBreaker` over N input strands. Each strand computes its own
/// bounded top-k concurrently (`crossbeam::scope` + `crossbeam::channel`
/// fan the work out and collect it back in), then the strands' results
/// are merged into one final bounded top-k in this thread.
pub struct MergeLimitingHeapSortOperator {
    columns: Vec<ColumnDef>,
    sort_on: Arc<Vec<SortKey>>,
    limit: usize,
    inputs: Vec<Box<dyn Operator>>,
    merged: Option<std::vec::IntoIter<(usize, Record)>>,
    last_strand: Option<usize>,
}

impl MergeLimitingHeapSortOperator {
    pub fn new(inputs: Vec<Box<dyn Operator>>, sort_on: Vec<SortKey>, limit: usize) -> Self {
        let columns = inputs.first().map(|i| i.columns().to_vec()).unwrap_or_default();
        Self {
            columns,
            sort_on: Arc::new(sort_on),
            limit,
            inputs,
            merged: None,
            last_strand: None,
        }
    }

    fn materialize(&mut self) -> Result<()> {
        let sort_on = Arc::clone(&self.sort_on);
        let limit = self.limit;
        let inputs = std::mem::take(&mut self.inputs);

        let strand_results: Vec<Result<Vec<Record>>> = crossbeam::scope(|scope| {
            let (tx, rx) = crossbeam::channel::bounded(inputs.len());
            for (strand, input) in inputs.into_iter().enumerate() {
                let tx = tx.clone();
                let sort_on = Arc::clone(&sort_on);
                scope.spawn(move |_| {
                    let result = drain_strand_top_k(strand, input, sort_on, limit);
                    tx.send((strand, result)).expect("merge channel receiver dropped before all strands reported");
                });
            }
            drop(tx);
            let mut collected: Vec<(usize, Result<Vec<Record>>)> = rx.iter().collect();
            collected.sort_by_key(|(strand, _)| *strand);
            collected.into_iter().map(|(_, result)| result).collect()
        })
        .map_err(|_| DbError::internal("a merge strand thread panicked"))?;

        let mut candidates: Vec<(usize, Record)> = Vec::new();
        for (strand, result) in strand_results.into_iter().enumerate() {
            for record in result? {
                candidates.push((strand, record));
            }
        }

        candidates.sort_by(|(strand_a, a), (strand_b, b)| compare_with_strand(&self.sort_on, a, *strand_a, b, *strand_b));
        candidates.truncate(self.limit);
        self.merged = Some(candidates.into_iter());
        Ok(())
    }
}

impl Operator for MergeLimitingHeapSortOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn is_breaker(&self) -> bool {
        true
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        if self.merged.is_none() {
            self.materialize()?;
        }
        match self.merged.as_mut().expect("materialized above").next() {
            Some((strand, record)) => {
                if self.last_strand != Some(strand) {
                    ctx.switch_strand(strand);
                    self.last_strand = Some(strand);
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        for input in &mut self.inputs {
            input.close();
        }
    }
}
