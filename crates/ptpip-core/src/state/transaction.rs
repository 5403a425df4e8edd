//! Transaction ID sequencing.

/// Per-session transaction ID counter.
///
/// IDs start at 1 and wrap from `0xFFFFFFFF` back to 1; 0 is never issued.
#[derive(Debug, Default)]
pub struct TransactionIds {
    last: u32,
}

impl TransactionIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next transaction ID.
    pub fn next_id(&mut self) -> u32 {
        self.last = match self.last {
            u32::MAX => 1,
            last => last + 1,
        };
        self.last
    }

    /// Most recently issued ID, if any.
    pub fn last(&self) -> Option<u32> {
        (self.last != 0).then_some(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_is_one() {
        let mut ids = TransactionIds::new();
        assert_eq!(ids.last(), None);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.last(), Some(2));
    }

    #[test]
    fn test_wraps_to_one_skipping_zero() {
        let mut ids = TransactionIds { last: u32::MAX - 1 };
        assert_eq!(ids.next_id(), u32::MAX);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }
}
