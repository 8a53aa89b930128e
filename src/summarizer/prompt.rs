//! Investigator prompt construction

use chrono::SecondsFormat;

use crate::types::case::Case;

/// Build the summarization prompt for a case
pub fn build_prompt(case: &Case) -> String {
    let signals = case
        .signals
        .iter()
        .map(|s| format!("- {}: {:.2} – {}", s.name, s.score, s.explanation))
        .collect::<Vec<_>>()
        .join("\n");

    let transactions = case
        .transactions
        .iter()
        .map(|t| {
            format!(
                "- {} | {:.2} {} at merchant {} via {} from {}",
                t.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false),
                t.amount,
                t.currency,
                t.merchant_id,
                t.channel,
                t.country.as_deref().unwrap_or("unknown"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a senior fraud investigator at a bank.

Write a concise narrative (3–6 sentences) and a short recommended next action plan (1–3 sentences)
for the following fraud case.

Risk score: {risk:.2}
Customer: {customer}
Primary account: {account}
Signals:
{signals}

Transactions:
{transactions}

Return your answer as two sections:
Narrative:
...
Recommendation:
...",
        risk = case.risk_score,
        customer = case.customer_id,
        account = case.primary_account_id,
        signals = signals,
        transactions = transactions,
    )
}
