// ABOUTME: Plaid adapter: accounts, transactions, and categorized spending summary
// ABOUTME: Speaks Plaid's POST-JSON protocol with client credentials in the body
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::providers::core::{adapter_client, post_json, DataAdapter, FetchOptions};

/// Fallback category for uncategorized expenses
const OTHER_CATEGORY: &str = "Other";

// -- Plaid API response shapes ------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<AccountObject>,
}

#[derive(Debug, Deserialize)]
struct AccountObject {
    account_id: String,
    name: String,
    #[serde(rename = "type")]
    account_type: String,
    subtype: Option<String>,
    balances: BalancesObject,
}

#[derive(Debug, Deserialize)]
struct BalancesObject {
    current: Option<f64>,
    available: Option<f64>,
    limit: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<TransactionObject>,
}

#[derive(Debug, Deserialize)]
struct TransactionObject {
    transaction_id: String,
    account_id: String,
    amount: f64,
    date: String,
    name: String,
    category: Option<Vec<String>>,
    pending: bool,
}

// -- Normalized schema --------------------------------------------------------

/// One linked bank account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaidAccount {
    /// Plaid account id
    pub id: String,
    /// Account display name
    pub name: String,
    /// Account type (depository, credit, ...)
    pub account_type: String,
    /// Account subtype (checking, savings, ...)
    pub subtype: String,
    /// Current balance
    pub current_balance: f64,
    /// Available balance, if reported
    pub available_balance: Option<f64>,
    /// Credit limit, if reported
    pub credit_limit: Option<f64>,
}

/// One transaction. Plaid reports outflows as positive amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaidTransaction {
    /// Plaid transaction id
    pub id: String,
    /// Owning account id
    pub account_id: String,
    /// Amount; positive is an expense, negative is income
    pub amount: f64,
    /// Transaction date, `YYYY-MM-DD`
    pub date: String,
    /// Merchant or description
    pub name: String,
    /// Category hierarchy, broadest first
    pub category: Vec<String>,
    /// Whether the transaction is still pending
    pub pending: bool,
}

/// Derived balance and spending summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingSummary {
    /// Sum of current balances across accounts
    pub total_balance: f64,
    /// Sum of inflows in the window
    pub total_income: f64,
    /// Sum of outflows in the window
    pub total_expenses: f64,
    /// Outflow totals per top-level category
    pub categorized_spending: BTreeMap<String, f64>,
}

/// Normalized Plaid payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaidData {
    /// Linked accounts
    pub accounts: Vec<PlaidAccount>,
    /// Transactions in the window
    pub transactions: Vec<PlaidTransaction>,
    /// Derived summary
    pub summary: SpendingSummary,
}

/// Plaid API adapter. Plaid authenticates with client credentials in the
/// request body rather than a bearer header.
pub struct PlaidAdapter {
    client: Client,
    base_url: String,
    client_id: String,
    secret: String,
}

impl PlaidAdapter {
    /// Build the adapter for the given Plaid environment and credentials.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, client_id: &str, secret: &str) -> AppResult<Self> {
        Ok(Self {
            client: adapter_client()?,
            base_url: base_url.to_owned(),
            client_id: client_id.to_owned(),
            secret: secret.to_owned(),
        })
    }

    async fn get_accounts(&self, access_token: &str) -> AppResult<Vec<PlaidAccount>> {
        let response: AccountsResponse = post_json(
            &self.client,
            Provider::Plaid,
            "accounts",
            &format!("{}/accounts/get", self.base_url),
            None,
            &json!({
                "client_id": self.client_id,
                "secret": self.secret,
                "access_token": access_token,
            }),
            &[],
        )
        .await?;

        Ok(response
            .accounts
            .into_iter()
            .map(|account| PlaidAccount {
                id: account.account_id,
                name: account.name,
                account_type: account.account_type,
                subtype: account.subtype.unwrap_or_default(),
                current_balance: account.balances.current.unwrap_or(0.0),
                available_balance: account.balances.available,
                credit_limit: account.balances.limit,
            })
            .collect())
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: &str,
        end: &str,
    ) -> AppResult<Vec<PlaidTransaction>> {
        let response: TransactionsResponse = post_json(
            &self.client,
            Provider::Plaid,
            "transactions",
            &format!("{}/transactions/get", self.base_url),
            None,
            &json!({
                "client_id": self.client_id,
                "secret": self.secret,
                "access_token": access_token,
                "start_date": start,
                "end_date": end,
            }),
            &[],
        )
        .await?;

        Ok(response
            .transactions
            .into_iter()
            .map(|tx| PlaidTransaction {
                id: tx.transaction_id,
                account_id: tx.account_id,
                amount: tx.amount,
                date: tx.date,
                name: tx.name,
                category: tx.category.unwrap_or_default(),
                pending: tx.pending,
            })
            .collect())
    }
}

/// Balance and cash-flow summary. Positive amounts are expenses, negative
/// amounts income. Empty inputs yield zero totals.
fn summarize(accounts: &[PlaidAccount], transactions: &[PlaidTransaction]) -> SpendingSummary {
    let total_balance = accounts.iter().map(|a| a.current_balance).sum();

    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut categorized_spending: BTreeMap<String, f64> = BTreeMap::new();

    for tx in transactions {
        if tx.amount < 0.0 {
            total_income += tx.amount.abs();
        } else {
            total_expenses += tx.amount;
            let category = tx
                .category
                .first()
                .cloned()
                .unwrap_or_else(|| OTHER_CATEGORY.to_owned());
            *categorized_spending.entry(category).or_insert(0.0) += tx.amount;
        }
    }

    SpendingSummary {
        total_balance,
        total_income,
        total_expenses,
        categorized_spending,
    }
}

#[async_trait]
impl DataAdapter for PlaidAdapter {
    fn provider(&self) -> Provider {
        Provider::Plaid
    }

    async fn fetch_normalized_data(
        &self,
        access_token: &str,
        options: &FetchOptions,
    ) -> AppResult<Value> {
        let (start, end) = options.date_range();

        let (accounts, transactions) = tokio::try_join!(
            self.get_accounts(access_token),
            self.get_transactions(access_token, &start, &end),
        )?;

        let summary = summarize(&accounts, &transactions);
        let data = PlaidData {
            accounts,
            transactions,
            summary,
        };

        serde_json::to_value(data)
            .map_err(|e| AppError::internal(format!("failed to serialize plaid payload: {e}")))
    }
}
