use std::time::Instant;




// ============================================================================
#[derive(Clone)]
pub struct RecurringTask {
    pub count: usize,
    pub next_at: usize,
}




// ============================================================================
impl RecurringTask {
    fn new() -> Self {
        Self {
            count: 0,
            next_at: 0,
        }
    }

    pub fn due(&self, processed: usize) -> bool {
        processed >= self.next_at
    }

    pub fn advance(&mut self, interval: usize) {
        self.count += 1;
        self.next_at += interval;
    }
}




// ============================================================================
#[derive(Clone)]
pub struct Tasks {
    pub report_progress: RecurringTask,
    pub run_initiated: Instant,
    pub snapshots_this_run: usize,
}




// ============================================================================
impl Tasks {
    pub fn new() -> Self {
        Self {
            report_progress: RecurringTask::new(),
            run_initiated: Instant::now(),
            snapshots_this_run: 0,
        }
    }

    pub fn record_snapshot(&mut self) {
        self.snapshots_this_run += 1;
    }

    pub fn report_progress(&mut self, interval: usize, processed: usize, total: usize, time: f64) {
        if !self.report_progress.due(processed) {
            return
        }
        let elapsed = self.run_initiated.elapsed().as_secs_f64();
        let rate = self.snapshots_this_run as f64 / elapsed.max(1e-9);
        println!(
            "[{:05}/{:05}] t={:.5} snapshots/s={:.2}",
            processed, total, time, rate);
        self.report_progress.advance(interval);
    }
}
