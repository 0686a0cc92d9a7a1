use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::Rng;

use crate::BundleCode;

/// Produces candidate codes. Uniqueness is enforced by the repository, not here.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> BundleCode;
}

/// Uniform random codes in `000000..=999999`
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn next_code(&self) -> BundleCode {
        BundleCode::from_number(rand::thread_rng().gen_range(0..=999_999))
    }
}

/// Hands out a fixed list of codes, then falls back to random ones.
///
/// Handy for demos and tests that need a known code.
#[derive(Debug, Default)]
pub struct SequenceCodes {
    queued: Mutex<VecDeque<BundleCode>>,
}

impl SequenceCodes {
    pub fn new<I: IntoIterator<Item = BundleCode>>(codes: I) -> Self {
        Self {
            queued: Mutex::new(codes.into_iter().collect()),
        }
    }

    pub fn push(&self, code: BundleCode) {
        self.queued.lock().push_back(code);
    }
}

impl CodeGenerator for SequenceCodes {
    fn next_code(&self) -> BundleCode {
        let queued = self.queued.lock().pop_front();
        queued.unwrap_or_else(|| RandomCodes.next_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = RandomCodes.next_code();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn sequence_codes_drain_in_order() {
        let codes = SequenceCodes::new([BundleCode::from_number(482913), BundleCode::from_number(7)]);
        assert_eq!(codes.next_code().as_str(), "482913");
        assert_eq!(codes.next_code().as_str(), "000007");
        assert_eq!(codes.next_code().as_str().len(), 6);
    }
}
