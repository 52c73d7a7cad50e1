use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// QuickBooks account id (QBO returns these as numeric strings).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

/// Account metadata as needed for cost classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub fully_qualified_name: String,
    pub account_type: String,
    pub account_sub_type: Option<String>,
    pub parent_id: Option<AccountId>,
    pub active: bool,
}

impl Account {
    pub fn new(id: &str, name: &str, account_type: &str) -> Self {
        Account {
            id: AccountId::new(id),
            name: name.to_string(),
            fully_qualified_name: name.to_string(),
            account_type: account_type.to_string(),
            account_sub_type: None,
            parent_id: None,
            active: true,
        }
    }

    pub fn with_parent(mut self, parent: &Account) -> Self {
        self.parent_id = Some(parent.id.clone());
        self.fully_qualified_name = format!("{}:{}", parent.fully_qualified_name, self.name);
        self
    }
}

pub type AccountsById = HashMap<AccountId, Account>;

pub fn index_accounts(accounts: impl IntoIterator<Item = Account>) -> AccountsById {
    accounts.into_iter().map(|a| (a.id.clone(), a)).collect()
}
