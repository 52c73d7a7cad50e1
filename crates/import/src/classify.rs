use std::collections::{BTreeMap, HashMap, HashSet};

use costbook_core::{Account, AccountId, AccountsById, Component};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub component: Component,
}

impl PrefixRule {
    pub fn new(prefix: &str, component: Component) -> Self {
        Self {
            prefix: prefix.to_string(),
            component,
        }
    }
}

pub fn default_prefixes() -> Vec<PrefixRule> {
    vec![
        // Longest first so "Inv Mfg Accessories" is not read as manufacturing.
        PrefixRule::new("Inv Mfg Accessories", Component::MfgAccessories),
        PrefixRule::new("Inv Manufacturing", Component::Manufacturing),
        PrefixRule::new("Inv Freight", Component::Freight),
        PrefixRule::new("Inv Duty", Component::Duty),
    ]
}

/// How bill line accounts map to cost components, as written in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Account id → component; sub-accounts inherit from the nearest mapped ancestor.
    AncestorChain { accounts: BTreeMap<String, Component> },
    /// Ordered, case-insensitive account name prefixes.
    NamePrefix {
        #[serde(default = "default_prefixes")]
        prefixes: Vec<PrefixRule>,
    },
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::NamePrefix {
            prefixes: default_prefixes(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse classifier config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Classifier config has no component mappings")]
    Empty,
}

impl ClassifierConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ClassifierConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let empty = match self {
            ClassifierConfig::AncestorChain { accounts } => accounts.is_empty(),
            ClassifierConfig::NamePrefix { prefixes } => prefixes.is_empty(),
        };
        if empty {
            Err(ConfigError::Empty)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("Account {0} not found")]
    UnknownAccount(AccountId),
    #[error("Account {0} has a cyclic parent chain")]
    AccountCycle(AccountId),
}

/// The classification strategy in effect for one parse call.
#[derive(Debug, Clone)]
pub enum Classifier {
    AncestorChain { index: HashMap<AccountId, Component> },
    NamePrefix { rules: Vec<(String, Component)> },
}

impl From<&ClassifierConfig> for Classifier {
    fn from(config: &ClassifierConfig) -> Self {
        match config {
            ClassifierConfig::AncestorChain { accounts } => Classifier::AncestorChain {
                index: accounts
                    .iter()
                    .map(|(id, c)| (AccountId::new(id.trim()), *c))
                    .collect(),
            },
            ClassifierConfig::NamePrefix { prefixes } => Classifier::NamePrefix {
                rules: prefixes
                    .iter()
                    .map(|r| (r.prefix.trim().to_lowercase(), r.component))
                    .collect(),
            },
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::from(&ClassifierConfig::default())
    }
}

impl Classifier {
    /// Returns the component for `account_id`, or `None` when the account is not
    /// a tracked inventory cost account.
    pub fn classify(
        &self,
        account_id: &AccountId,
        accounts: &AccountsById,
    ) -> Result<Option<Component>, ClassifyError> {
        let account = accounts
            .get(account_id)
            .ok_or_else(|| ClassifyError::UnknownAccount(account_id.clone()))?;

        match self {
            Classifier::AncestorChain { index } => walk_ancestors(account, accounts, index),
            Classifier::NamePrefix { rules } => Ok(match_prefix(account, rules)),
        }
    }
}

fn walk_ancestors(
    account: &Account,
    accounts: &AccountsById,
    index: &HashMap<AccountId, Component>,
) -> Result<Option<Component>, ClassifyError> {
    let mut seen: HashSet<&AccountId> = HashSet::new();
    let mut current = Some(account);
    while let Some(acct) = current {
        if !seen.insert(&acct.id) {
            return Err(ClassifyError::AccountCycle(account.id.clone()));
        }
        if let Some(component) = index.get(&acct.id) {
            return Ok(Some(*component));
        }
        // A parent missing from the lookup ends the chain.
        current = acct.parent_id.as_ref().and_then(|p| accounts.get(p));
    }
    Ok(None)
}

fn match_prefix(account: &Account, rules: &[(String, Component)]) -> Option<Component> {
    let name = account.name.to_lowercase();
    let qualified = account.fully_qualified_name.to_lowercase();
    rules
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix.as_str()))
        .or_else(|| {
            rules
                .iter()
                .find(|(prefix, _)| qualified.starts_with(prefix.as_str()))
        })
        .map(|(_, component)| *component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use costbook_core::index_accounts;

    fn chart() -> AccountsById {
        let inventory = Account::new("80", "Inventory Asset", "Other Current Asset");
        let mfg = Account::new("81", "Inv Manufacturing", "Other Current Asset").with_parent(&inventory);
        let mfg_sub = Account::new("82", "Factory A", "Other Current Asset").with_parent(&mfg);
        let freight = Account::new("83", "Inv Freight", "Other Current Asset").with_parent(&inventory);
        let acc = Account::new("84", "Inv Mfg Accessories", "Other Current Asset").with_parent(&inventory);
        let office = Account::new("90", "Office Supplies", "Expense");
        index_accounts(vec![inventory, mfg, mfg_sub, freight, acc, office])
    }

    fn ancestor_classifier() -> Classifier {
        let config = ClassifierConfig::AncestorChain {
            accounts: BTreeMap::from([
                ("81".to_string(), Component::Manufacturing),
                ("83".to_string(), Component::Freight),
            ]),
        };
        Classifier::from(&config)
    }

    #[test]
    fn ancestor_chain_matches_direct_account() {
        let c = ancestor_classifier();
        assert_eq!(c.classify(&"81".into(), &chart()), Ok(Some(Component::Manufacturing)));
        assert_eq!(c.classify(&"83".into(), &chart()), Ok(Some(Component::Freight)));
    }

    #[test]
    fn ancestor_chain_inherits_from_parent() {
        let c = ancestor_classifier();
        assert_eq!(c.classify(&"82".into(), &chart()), Ok(Some(Component::Manufacturing)));
    }

    #[test]
    fn ancestor_chain_unmapped_is_none() {
        let c = ancestor_classifier();
        assert_eq!(c.classify(&"90".into(), &chart()), Ok(None));
        assert_eq!(c.classify(&"80".into(), &chart()), Ok(None));
    }

    #[test]
    fn unknown_account_is_an_error() {
        let c = ancestor_classifier();
        assert_eq!(
            c.classify(&"999".into(), &chart()),
            Err(ClassifyError::UnknownAccount("999".into()))
        );
    }

    #[test]
    fn cyclic_parents_are_an_error() {
        let mut a = Account::new("1", "A", "Expense");
        let mut b = Account::new("2", "B", "Expense");
        a.parent_id = Some("2".into());
        b.parent_id = Some("1".into());
        let accounts = index_accounts(vec![a, b]);
        let c = ancestor_classifier();
        assert_eq!(
            c.classify(&"1".into(), &accounts),
            Err(ClassifyError::AccountCycle("1".into()))
        );
    }

    #[test]
    fn name_prefix_defaults() {
        let c = Classifier::default();
        let accounts = chart();
        assert_eq!(c.classify(&"81".into(), &accounts), Ok(Some(Component::Manufacturing)));
        assert_eq!(c.classify(&"84".into(), &accounts), Ok(Some(Component::MfgAccessories)));
        assert_eq!(c.classify(&"83".into(), &accounts), Ok(Some(Component::Freight)));
        assert_eq!(c.classify(&"90".into(), &accounts), Ok(None));
    }

    #[test]
    fn name_prefix_is_case_insensitive() {
        let accounts = index_accounts(vec![Account::new("5", "INV DUTY - US CBP", "Expense")]);
        assert_eq!(
            Classifier::default().classify(&"5".into(), &accounts),
            Ok(Some(Component::Duty))
        );
    }

    #[test]
    fn name_prefix_does_not_walk_parents() {
        // "Factory A" sits under Inv Manufacturing but its own name has no prefix;
        // its qualified name starts with the parent chain, which is not a prefix either.
        let c = Classifier::default();
        assert_eq!(c.classify(&"82".into(), &chart()), Ok(None));
    }

    #[test]
    fn config_from_toml_ancestor_chain() {
        let toml = r#"
            strategy = "ancestor_chain"

            [accounts]
            "81" = "manufacturing"
            "83" = "freight"
            "85" = "mfg_accessories"
        "#;
        let config = ClassifierConfig::from_toml(toml).unwrap();
        match config {
            ClassifierConfig::AncestorChain { accounts } => {
                assert_eq!(accounts.len(), 3);
                assert_eq!(accounts["85"], Component::MfgAccessories);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn config_from_toml_name_prefix_defaults() {
        let config = ClassifierConfig::from_toml(r#"strategy = "name_prefix""#).unwrap();
        assert_eq!(config, ClassifierConfig::default());
    }

    #[test]
    fn config_rejects_empty_mapping() {
        let toml = "strategy = \"ancestor_chain\"\n[accounts]\n";
        assert!(matches!(ClassifierConfig::from_toml(toml), Err(ConfigError::Empty)));
    }

    #[test]
    fn config_rejects_unknown_component() {
        let toml = "strategy = \"ancestor_chain\"\n[accounts]\n\"1\" = \"shipping\"\n";
        assert!(matches!(ClassifierConfig::from_toml(toml), Err(ConfigError::Toml(_))));
    }
}
