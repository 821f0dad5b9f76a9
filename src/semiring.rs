use ordered_float::OrderedFloat;
use std::fmt;
use std::iter::{Product, Sum};

/// Base of every logarithm in this crate.
pub const LOG_BASE: f64 = 2.0;

/// A probability stored as its base-2 logarithm.
///
/// Probability zero has no finite logarithm, so it is kept as an
/// explicit sentinel ("log-zero") rather than `-inf`.  This keeps
/// non-finite values out of the arithmetic entirely: a `LogProb` is
/// either log-zero or a finite number.
///
/// Log-zero orders below every finite value, so comparing two
/// `LogProb`s compares the probabilities they stand for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogProb(Option<OrderedFloat<f64>>);

impl LogProb {
    /// Log-zero, i.e. probability 0.
    pub fn zero() -> Self {
        LogProb(None)
    }

    /// Log-one, i.e. probability 1.
    pub fn one() -> Self {
        LogProb(Some(OrderedFloat(0.0)))
    }

    /// Wrap a base-2 log value.  Panics on NaN or infinities.
    pub fn from_log2(value: f64) -> Self {
        assert!(value.is_finite(), "log probability {} is not finite", value);
        LogProb(Some(OrderedFloat(value)))
    }

    /// Convert a linear probability; exactly 0 becomes log-zero.
    pub fn from_probability(prob: f64) -> Self {
        if prob == 0.0 {
            Self::zero()
        } else {
            Self::from_log2(prob.log2())
        }
    }

    /// The base-2 log value, or `None` for log-zero.
    pub fn value(&self) -> Option<f64> {
        self.0.map(OrderedFloat::into_inner)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// Back to linear space.  May underflow to 0.0 for very small
    /// probabilities, which is why the crate never does this itself.
    pub fn probability(&self) -> f64 {
        match self.value() {
            Some(v) => LOG_BASE.powf(v),
            None => 0.0,
        }
    }

    /// log2(2^a + 2^b).
    ///
    /// The terms are shifted by the larger operand before
    /// exponentiating, so the larger term becomes exactly 1 and the sum
    /// stays in [1, 2] whatever the magnitudes:
    /// `2^(a-m) + 2^(b-m) = (2^a + 2^b) / 2^m`.
    pub fn log_sum(self, other: Self) -> Self {
        let (a, b) = match (self.value(), other.value()) {
            (None, None) => return Self::zero(),
            (Some(_), None) => return self,
            (None, Some(_)) => return other,
            (Some(a), Some(b)) => (a, b),
        };
        let m = a.max(b);
        let scaled = LOG_BASE.powf(a - m) + LOG_BASE.powf(b - m);
        Self::from_log2(scaled.log2() + m)
    }

    /// log2(2^a * 2^b) = a + b; log-zero absorbs.
    pub fn log_product(self, other: Self) -> Self {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => Self::from_log2(a + b),
            _ => Self::zero(),
        }
    }
}

impl fmt::Display for LogProb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "-inf"),
        }
    }
}

impl Sum for LogProb {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Self::log_sum)
    }
}

impl<'a> Sum<&'a LogProb> for LogProb {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Product for LogProb {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::one(), Self::log_product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 1e-10;

    fn lp(v: f64) -> LogProb {
        LogProb::from_log2(v)
    }

    fn assert_close(actual: LogProb, expected: f64) {
        let v = actual.value().expect("expected a finite log probability");
        assert!(
            (v - expected).abs() < THRESHOLD,
            "{} is not within {} of {}",
            v,
            THRESHOLD,
            expected
        );
    }

    #[test]
    fn it_sums_reference_values() {
        assert_close(lp(0.0).log_sum(lp(0.0)), 1.0);
        assert_close(lp(0.0).log_sum(lp(-123.0)), 0.0);
        assert_close(lp(-234.0).log_sum(lp(-234.0)), -233.0);
        assert_close(lp(-478.0).log_sum(lp(-478.0)), -477.0);
    }

    #[test]
    fn zero_is_the_identity_for_sum() {
        let zero = LogProb::zero();
        assert_eq!(zero.log_sum(zero), zero);
        for v in [-0.5, -17.25, 3.0, -1000.0] {
            assert_eq!(lp(v).log_sum(zero), lp(v));
            assert_eq!(zero.log_sum(lp(v)), lp(v));
        }
    }

    #[test]
    fn sum_is_commutative_and_doubles() {
        let values = [-0.1, -2.0, -37.5, -600.0, 0.0, 1.5];
        for &a in values.iter() {
            assert_close(lp(a).log_sum(lp(a)), a + 1.0);
            for &b in values.iter() {
                let ab = lp(a).log_sum(lp(b)).value().unwrap();
                let ba = lp(b).log_sum(lp(a)).value().unwrap();
                assert!((ab - ba).abs() < THRESHOLD);
            }
        }
    }

    #[test]
    fn sum_survives_operands_far_apart() {
        // 2^-1 + 2^-2000 rounds to 2^-1; the tiny term must not blow up
        assert_close(lp(-1.0).log_sum(lp(-2000.0)), -1.0);
        assert_close(lp(-2000.0).log_sum(lp(-1.0)), -1.0);
    }

    #[test]
    fn sum_survives_large_operands() {
        assert_close(lp(1100.0).log_sum(lp(1100.0)), 1101.0);
        assert_close(lp(2000.0).log_sum(lp(-2000.0)), 2000.0);
        assert_close(lp(1.5).log_sum(lp(0.0)), (LOG_BASE.powf(1.5) + 1.0).log2());
    }

    #[test]
    fn sum_matches_linear_space() {
        let p = LogProb::from_probability(0.25).log_sum(LogProb::from_probability(0.5));
        assert!((p.probability() - 0.75).abs() < THRESHOLD);
        // probability one is log 0
        let q = LogProb::one().log_sum(LogProb::from_probability(0.5));
        assert_close(q, 1.5f64.log2());
    }

    #[test]
    fn it_multiplies() {
        let zero = LogProb::zero();
        assert_eq!(zero.log_product(zero), zero);
        assert_eq!(zero.log_product(lp(-5.0)), zero);
        assert_eq!(lp(13.0).log_product(zero), zero);
        assert_eq!(lp(-5.0).log_product(lp(13.0)), lp(8.0));
        for v in [-0.5, -17.25, 3.0] {
            assert_eq!(lp(v).log_product(lp(0.0)), lp(v));
        }
    }

    #[test]
    fn it_folds_iterators() {
        let terms = vec![
            LogProb::from_probability(0.125),
            LogProb::zero(),
            LogProb::from_probability(0.375),
        ];
        let total: LogProb = terms.iter().sum();
        assert_close(total, -1.0);
        let empty: Vec<LogProb> = Vec::new();
        assert!(empty.iter().sum::<LogProb>().is_zero());
        assert_eq!(empty.into_iter().product::<LogProb>(), LogProb::one());
        let prod: LogProb = vec![lp(-1.0), lp(-2.0)].into_iter().product();
        assert_eq!(prod, lp(-3.0));
    }

    #[test]
    fn it_converts_probabilities() {
        assert!(LogProb::from_probability(0.0).is_zero());
        assert_eq!(LogProb::from_probability(1.0), LogProb::one());
        assert_eq!(LogProb::from_probability(0.5), lp(-1.0));
        assert_eq!(LogProb::zero().probability(), 0.0);
        assert_eq!(LogProb::default(), LogProb::zero());
        assert!(LogProb::zero() < lp(-1000.0));
        assert!(lp(-3.0) < lp(-1.0));
        assert_eq!(format!("{}", LogProb::zero()), "-inf");
        assert_eq!(format!("{}", lp(-2.5)), "-2.5");
    }

    #[test]
    #[should_panic]
    fn it_rejects_non_finite_values() {
        LogProb::from_log2(f64::NAN);
    }
}
