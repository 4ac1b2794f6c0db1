use linked_hash_map::LinkedHashMap;
use log::info;

/// Append-only log with a hard cap. Once `cap` is exceeded the log is
/// trimmed oldest-first down to `trim_to`, so trims happen in batches
/// instead of on every push.
pub struct BoundedLog<E> {
    entries: LinkedHashMap<u64, E>,
    seq: u64,
    cap: usize,
    trim_to: usize,
}

impl<E> BoundedLog<E> {
    pub fn new(cap: usize, trim_to: usize) -> Self {
        assert!(trim_to <= cap);
        Self {
            entries: LinkedHashMap::new(),
            seq: 0,
            cap,
            trim_to,
        }
    }

    pub fn push(&mut self, entry: E) -> u64 {
        self.seq += 1;
        self.entries.insert(self.seq, entry);

        if self.entries.len() > self.cap {
            self.trim();
        }

        self.seq
    }

    /// Trims oldest-first down to `trim_to` if the log is over cap.
    pub fn trim(&mut self) -> usize {
        let mut dropped = 0;
        while self.entries.len() > self.trim_to {
            self.entries.pop_front();
            dropped += 1;
        }

        if dropped > 0 {
            info!("trimmed {} oldest entries from the message log", dropped);
        }

        dropped
    }

    pub fn get(&self, seq: u64) -> Option<&E> {
        self.entries.get(&seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &E)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut log = BoundedLog::new(10, 8);
        for i in 0..5 {
            log.push(i);
        }

        let values: Vec<_> = log.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn trims_oldest_first_past_cap() {
        let mut log = BoundedLog::new(10, 8);
        for i in 0..11 {
            log.push(i);
        }

        // 11th push crossed the cap: trimmed down to 8, oldest gone
        assert_eq!(log.len(), 8);
        let first = log.iter().next().map(|(_, v)| *v);
        assert_eq!(first, Some(3));
    }

    #[test]
    fn explicit_trim_is_idempotent_under_cap() {
        let mut log = BoundedLog::new(10, 8);
        for i in 0..5 {
            log.push(i);
        }

        assert_eq!(log.trim(), 0);
        assert_eq!(log.len(), 5);
    }
}
