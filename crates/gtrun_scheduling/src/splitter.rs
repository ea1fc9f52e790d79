use std::collections::HashMap;

use gtrun_results::TestCase;

/// Splits a set of test cases into one batch per worker.
pub trait TestsSplitter {
    fn split_test_cases(&self) -> Vec<Vec<TestCase>>;
}

/// Splits test cases into batches of roughly equal total duration.
///
/// # Algorithm
///
/// 1. The target duration of a batch is the overall duration divided by the
///    number of workers (integer division).
/// 2. Test cases are sorted by duration, longest first. Ties are broken by
///    fully qualified name, then executable, so the split is deterministic.
/// 3. Batches are filled greedily: each batch takes the longest remaining case
///    and then keeps taking the next one while the batch stays within the
///    target. A batch is also closed once the remaining cases are no more than
///    the batches still to open, so that every worker gets at least one case
///    when there are enough of them.
/// 4. Once `worker_count` batches are open, each remaining case goes to the
///    batch with the smallest accumulated duration.
/// 5. The result is padded with empty batches to exactly `worker_count`.
#[derive(Debug, Clone)]
pub struct DurationBasedTestsSplitter {
    test_durations: Vec<(TestCase, u64)>,
    overall_duration: u64,
    worker_count: usize,
}

impl DurationBasedTestsSplitter {
    pub fn new(test_durations: &HashMap<TestCase, u64>, worker_count: usize) -> Self {
        let mut sorted: Vec<(TestCase, u64)> = test_durations
            .iter()
            .map(|(test_case, duration)| (test_case.clone(), *duration))
            .collect();
        sorted.sort_by(|(a, a_duration), (b, b_duration)| {
            b_duration.cmp(a_duration).then_with(|| a.cmp(b))
        });

        Self {
            overall_duration: sorted.iter().map(|(_, duration)| duration).sum(),
            test_durations: sorted,
            worker_count: worker_count.max(1),
        }
    }

    pub const fn target_duration(&self) -> u64 {
        self.overall_duration / self.worker_count as u64
    }
}

impl TestsSplitter for DurationBasedTestsSplitter {
    fn split_test_cases(&self) -> Vec<Vec<TestCase>> {
        let target = self.target_duration();
        let mut remaining = self.test_durations.iter().peekable();

        let mut batches: Vec<Vec<TestCase>> = Vec::with_capacity(self.worker_count);
        let mut batch_durations: Vec<u64> = Vec::with_capacity(self.worker_count);

        while batches.len() < self.worker_count {
            let Some((first, first_duration)) = remaining.next() else {
                break;
            };
            let mut batch = vec![first.clone()];
            let mut batch_duration = *first_duration;

            // Batches that will still be opened after this one.
            let batches_to_open = self.worker_count - batches.len() - 1;

            while let Some((_, next_duration)) = remaining.peek() {
                let cases_left = remaining.len();
                if batch_duration + next_duration > target || cases_left <= batches_to_open {
                    break;
                }
                let Some((next, next_duration)) = remaining.next() else {
                    break;
                };
                batch.push(next.clone());
                batch_duration += next_duration;
            }

            batches.push(batch);
            batch_durations.push(batch_duration);
        }

        for (test_case, duration) in remaining {
            let lightest = find_lightest_batch(&batch_durations);
            batches[lightest].push(test_case.clone());
            batch_durations[lightest] += duration;
        }

        batches.resize_with(self.worker_count, Vec::new);
        batches
    }
}

/// Index of the first batch with the smallest accumulated duration.
fn find_lightest_batch(batch_durations: &[u64]) -> usize {
    batch_durations
        .iter()
        .enumerate()
        .min_by_key(|(_, duration)| **duration)
        .map_or(0, |(index, _)| index)
}

/// Deals test cases out to the workers in turn, ignoring durations.
#[derive(Debug, Clone)]
pub struct NumberBasedTestsSplitter {
    test_cases: Vec<TestCase>,
    worker_count: usize,
}

impl NumberBasedTestsSplitter {
    pub fn new(test_cases: &[TestCase], worker_count: usize) -> Self {
        Self {
            test_cases: test_cases.to_vec(),
            worker_count: worker_count.max(1),
        }
    }
}

impl TestsSplitter for NumberBasedTestsSplitter {
    fn split_test_cases(&self) -> Vec<Vec<TestCase>> {
        let mut batches = vec![Vec::new(); self.worker_count];
        for (index, test_case) in self.test_cases.iter().enumerate() {
            batches[index % self.worker_count].push(test_case.clone());
        }
        batches
    }
}
