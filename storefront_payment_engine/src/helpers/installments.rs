use serde::Serialize;
use spg_common::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentOption {
    pub count: u8,
    /// The amount of each installment, rounded to the nearest cent
    pub per_installment: Cents,
    /// What the customer pays in total, including interest
    pub total_with_interest: Cents,
    pub interest: Cents,
}

/// Computes an installment schedule for 1..=`max_installments` payments of `total`.
///
/// `annual_interest_rate` is a percentage (e.g. `2.99`). Payments follow the amortized (Price table) formula
/// `P·r(1+r)^n / ((1+r)^n − 1)` with `r = annual_interest_rate / 100 / 12`. A zero rate is plain equal division.
/// Each figure is rounded independently, so `per_installment × count` may differ from `total_with_interest` by a few
/// cents.
pub fn calculate_installments(total: Cents, max_installments: u8, annual_interest_rate: f64) -> Vec<InstallmentOption> {
    let principal = total.value() as f64;
    let monthly_rate = annual_interest_rate.max(0.0) / 100.0 / 12.0;
    (1..=max_installments)
        .map(|count| {
            let n = f64::from(count);
            let payment = if monthly_rate == 0.0 {
                principal / n
            } else {
                let growth = (1.0 + monthly_rate).powf(n);
                principal * monthly_rate * growth / (growth - 1.0)
            };
            let per_installment = Cents::from(payment.round() as i64);
            let total_with_interest = Cents::from((payment * n).round() as i64);
            InstallmentOption { count, per_installment, total_with_interest, interest: total_with_interest - total }
        })
        .collect()
}
