//! Black–Scholes closed forms
//!
//! The only floating-point island in the system. Inputs: spot, strike,
//! time-to-expiry in years, annualized risk-free rate and volatility.
//! Theta is reported per calendar day, vega per 1% volatility move, rho per
//! 1% rate move. Degenerate inputs (t or σ or S or K at or below zero)
//! price to zero with zero Greeks.

use types::option::{Greeks, OptionType};

const DAYS_PER_YEAR: f64 = 365.0;

/// Theoretical option price.
pub fn price(option_type: OptionType, s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    if degenerate(s, k, t, sigma) {
        return 0.0;
    }
    let (d1, d2) = d1_d2(s, k, t, r, sigma);
    let discount = (-r * t).exp();
    match option_type {
        OptionType::Call => s * norm_cdf(d1) - k * discount * norm_cdf(d2),
        OptionType::Put => k * discount * norm_cdf(-d2) - s * norm_cdf(-d1),
    }
}

/// All five sensitivities at once; shares the d1/d2 evaluation.
pub fn greeks(option_type: OptionType, s: f64, k: f64, t: f64, r: f64, sigma: f64) -> Greeks {
    if degenerate(s, k, t, sigma) {
        return Greeks::ZERO;
    }
    let (d1, d2) = d1_d2(s, k, t, r, sigma);
    let discount = (-r * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let delta = match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => norm_cdf(d1) - 1.0,
    };
    let gamma = pdf_d1 / (s * sigma * t.sqrt());
    let decay = -s * pdf_d1 * sigma / (2.0 * t.sqrt());
    let theta_annual = match option_type {
        OptionType::Call => decay - r * k * discount * norm_cdf(d2),
        OptionType::Put => decay + r * k * discount * norm_cdf(-d2),
    };
    let vega = s * pdf_d1 * t.sqrt();
    let rho_full = match option_type {
        OptionType::Call => k * t * discount * norm_cdf(d2),
        OptionType::Put => -k * t * discount * norm_cdf(-d2),
    };

    Greeks {
        delta,
        gamma,
        theta: theta_annual / DAYS_PER_YEAR,
        vega: vega / 100.0,
        rho: rho_full / 100.0,
    }
}

fn degenerate(s: f64, k: f64, t: f64, sigma: f64) -> bool {
    t <= 0.0 || sigma <= 0.0 || s <= 0.0 || k <= 0.0
}

fn d1_d2(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> (f64, f64) {
    let d1 = ((s / k).ln() + (r + sigma * sigma / 2.0) * t) / (sigma * t.sqrt());
    (d1, d1 - sigma * t.sqrt())
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn norm_pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz–Stegun 7.1.26 rational approximation, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}
