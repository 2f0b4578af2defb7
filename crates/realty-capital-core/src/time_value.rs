use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::CapitalError;
use crate::types::{Money, Rate};
use crate::CapitalResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Default starting point for the Newton-Raphson IRR search.
pub const DEFAULT_IRR_GUESS: Rate = dec!(0.10);

const IRR_FLOOR: Rate = dec!(-0.99);
const IRR_CEILING: Rate = dec!(10.0);
const BISECTION_FLOOR: Rate = dec!(-0.9);

/// Net Present Value of a series of cash flows (index 0 undiscounted).
pub fn npv(rate: Rate, cash_flows: &[Money]) -> CapitalResult<Money> {
    if rate <= dec!(-1) {
        return Err(CapitalError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount.is_zero() {
            return Err(CapitalError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

/// NPV and its derivative with respect to the rate, in one pass.
fn npv_and_derivative(rate: Rate, cash_flows: &[Money]) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    let mut discount = Decimal::ONE;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            // Past Decimal range the remaining present values are negligible.
            match discount.checked_mul(one_plus_r) {
                Some(d) => discount = d,
                None => break,
            }
        }
        let pv = cf.checked_div(discount)?;
        value += pv;
        if t > 0 {
            derivative -= Decimal::from(t as i64) * pv / one_plus_r;
        }
    }
    Some((value, derivative))
}

/// Internal Rate of Return using Newton-Raphson from `guess`, capped at
/// 100 iterations.
pub fn irr(cash_flows: &[Money], guess: Rate) -> CapitalResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(CapitalError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }

    let mut rate = guess;
    let mut last_delta = Decimal::MAX;

    for i in 0..MAX_IRR_ITERATIONS {
        let (npv_val, dnpv) = npv_and_derivative(rate, cash_flows).ok_or_else(|| {
            CapitalError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta,
            }
        })?;
        last_delta = npv_val;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(CapitalError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta: npv_val,
            });
        }

        rate -= npv_val / dnpv;

        // Guard against divergence
        if rate < IRR_FLOOR {
            rate = IRR_FLOOR;
        } else if rate > IRR_CEILING {
            rate = IRR_CEILING;
        }
    }

    Err(CapitalError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta,
    })
}

/// IRR by bisection over [-90%, 1000%]. Slower than Newton-Raphson but
/// always converges when the NPV changes sign inside the bracket.
pub fn irr_bisection(cash_flows: &[Money]) -> CapitalResult<Rate> {
    let npv_at = |r: Rate| npv_and_derivative(r, cash_flows).map(|(v, _)| v);
    let (mut lo, mut hi) = (BISECTION_FLOOR, IRR_CEILING);
    let (Some(mut f_lo), Some(f_hi)) = (npv_at(lo), npv_at(hi)) else {
        return Err(CapitalError::ConvergenceFailure {
            function: "IRR (bisection)".into(),
            iterations: 0,
            last_delta: Decimal::MAX,
        });
    };
    if f_lo.is_sign_negative() == f_hi.is_sign_negative() {
        return Err(CapitalError::ConvergenceFailure {
            function: "IRR (bisection)".into(),
            iterations: 0,
            last_delta: f_lo,
        });
    }

    let mut mid = (lo + hi) / dec!(2);
    for _ in 0..MAX_BISECTION_ITERATIONS {
        mid = (lo + hi) / dec!(2);
        let f_mid = npv_at(mid).unwrap_or(Decimal::ZERO);
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo) < CONVERGENCE_THRESHOLD {
            return Ok(mid);
        }
        if f_mid.is_sign_negative() == f_lo.is_sign_negative() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Ok(mid)
}

/// IRR of a cash-flow series, or `None` when it is undefined (no sign
/// change) or neither solver converges.
pub fn irr_opt(cash_flows: &[Money]) -> Option<Rate> {
    let has_outflow = cash_flows.iter().any(|cf| cf.is_sign_negative() && !cf.is_zero());
    let has_inflow = cash_flows.iter().any(|cf| cf.is_sign_positive() && !cf.is_zero());
    if !has_outflow || !has_inflow {
        return None;
    }
    irr(cash_flows, DEFAULT_IRR_GUESS)
        .or_else(|_| irr_bisection(cash_flows))
        .ok()
}

/// Level payment that amortizes `principal` to zero over `nper` periods.
/// Returned as a positive amount. Zero rate amortizes linearly.
pub fn level_payment(principal: Money, rate: Rate, nper: u32) -> CapitalResult<Money> {
    if nper == 0 {
        return Err(CapitalError::InvalidInput {
            field: "nper".into(),
            reason: "Number of periods must be > 0".into(),
        });
    }

    if rate.is_zero() {
        return Ok(principal / Decimal::from(nper));
    }

    let factor = (Decimal::ONE + rate).powi(nper as i64);
    let denominator = factor - Decimal::ONE;
    if denominator.is_zero() {
        return Err(CapitalError::DivisionByZero {
            context: "level payment annuity factor".into(),
        });
    }

    Ok(principal * rate * factor / denominator)
}
