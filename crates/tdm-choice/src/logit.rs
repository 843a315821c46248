//! Multinomial logit kernels on one chooser's utility row.

use crate::{ChoiceError, ChoiceResult};

/// Softmax of `utils` into `probs`.
///
/// `-inf` utilities mark unavailable alternatives and get probability zero.
pub fn utils_to_probs(chooser: i64, utils: &[f64], probs: &mut Vec<f64>) -> ChoiceResult<()> {
    probs.clear();
    if utils.iter().any(|u| u.is_nan()) {
        return Err(ChoiceError::InvalidUtility { chooser });
    }
    let max = utils.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Err(ChoiceError::NoAvailableAlternatives { chooser });
    }
    probs.extend(utils.iter().map(|u| (u - max).exp()));
    let total: f64 = probs.iter().sum();
    probs.iter_mut().for_each(|p| *p /= total);
    Ok(())
}

/// `ln(sum(exp(u)))`, stable for large utilities.
pub fn logsum(utils: &[f64]) -> f64 {
    let max = utils.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + utils.iter().map(|u| (u - max).exp()).sum::<f64>().ln()
}

/// Inverse-CDF pick: first position whose cumulative probability exceeds `u`.
///
/// Rounding can leave the final cumulative sum a hair below `u`; the last
/// alternative with positive probability is returned in that case.
pub fn make_choice(probs: &[f64], u: f64) -> Option<usize> {
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if acc > u {
            return Some(i);
        }
    }
    probs.iter().rposition(|p| *p > 0.0)
}
