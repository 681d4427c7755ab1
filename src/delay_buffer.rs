/// Ring of per-timestep batches for events that arrive a bounded number of
/// steps in the future. `advance` drains the batch due at the current step;
/// afterwards `schedule(d, ..)` targets the step `d` after the drained one.
#[derive(Debug)]
pub struct DelayBuffer<T> {
    batches: Vec<Vec<T>>,
    current_pos: usize,
    num_pending: usize,
}

impl<T> DelayBuffer<T> {
    pub fn new(max_delay: usize) -> DelayBuffer<T> {
        DelayBuffer {
            batches: (0..max_delay.max(1)).map(|_| Vec::new()).collect(),
            current_pos: 0,
            num_pending: 0,
        }
    }

    pub fn max_delay(&self) -> usize {
        self.batches.len()
    }

    pub fn schedule(&mut self, delay: usize, value: T) {
        debug_assert!(delay >= 1 && delay <= self.max_delay());

        let target_pos = self.get_target_pos(delay - 1);
        self.batches[target_pos].push(value);
        self.num_pending += 1;
    }

    fn get_target_pos(&self, offset: usize) -> usize {
        let mut target_pos = self.current_pos + offset;

        if target_pos >= self.batches.len() {
            target_pos -= self.batches.len();
        }

        target_pos
    }

    pub fn num_pending(&self) -> usize {
        self.num_pending
    }

    pub fn advance(&mut self) -> impl Iterator<Item = T> + '_ {
        let pos = self.current_pos;
        self.current_pos += 1;
        if self.current_pos == self.batches.len() {
            self.current_pos = 0;
        }
        self.num_pending -= self.batches[pos].len();
        self.batches[pos].drain(..)
    }
}
