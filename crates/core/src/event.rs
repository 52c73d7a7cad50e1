use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of landed inventory cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Manufacturing,
    Freight,
    Duty,
    MfgAccessories,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Manufacturing,
        Component::Freight,
        Component::Duty,
        Component::MfgAccessories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Manufacturing => "manufacturing",
            Component::Freight => "freight",
            Component::Duty => "duty",
            Component::MfgAccessories => "mfg_accessories",
        }
    }

    /// Manufacturing lines carry unit counts; every other component is spread over them.
    pub fn is_unit_bearing(self) -> bool {
        matches!(self, Component::Manufacturing)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "manufacturing" => Ok(Component::Manufacturing),
            "freight" => Ok(Component::Freight),
            "duty" => Ok(Component::Duty),
            "mfgaccessories" => Ok(Component::MfgAccessories),
            _ => Err(format!("Unknown cost component: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingEvent {
    pub date: NaiveDate,
    pub po_number: String,
    pub sku: String,
    pub units: i64,
    pub cost_cents: i64,
    pub bill_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEvent {
    pub date: NaiveDate,
    pub po_number: String,
    pub component: Component,
    pub cost_cents: i64,
    /// Parsed from the line description when possible; informational only.
    pub sku: Option<String>,
    pub bill_id: String,
}

/// A cost taken from a bill/component mapping recorded when the bill was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandCostEvent {
    pub date: NaiveDate,
    pub po_number: String,
    pub brand_id: String,
    pub component: Component,
    pub cost_cents: i64,
    pub bill_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    Manufacturing(ManufacturingEvent),
    Cost(CostEvent),
    BrandCost(BrandCostEvent),
}

impl InventoryEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            InventoryEvent::Manufacturing(e) => e.date,
            InventoryEvent::Cost(e) => e.date,
            InventoryEvent::BrandCost(e) => e.date,
        }
    }

    pub fn po_number(&self) -> &str {
        match self {
            InventoryEvent::Manufacturing(e) => &e.po_number,
            InventoryEvent::Cost(e) => &e.po_number,
            InventoryEvent::BrandCost(e) => &e.po_number,
        }
    }

    pub fn cost_cents(&self) -> i64 {
        match self {
            InventoryEvent::Manufacturing(e) => e.cost_cents,
            InventoryEvent::Cost(e) => e.cost_cents,
            InventoryEvent::BrandCost(e) => e.cost_cents,
        }
    }

    pub fn component(&self) -> Component {
        match self {
            InventoryEvent::Manufacturing(_) => Component::Manufacturing,
            InventoryEvent::Cost(e) => e.component,
            InventoryEvent::BrandCost(e) => e.component,
        }
    }

    pub fn bill_id(&self) -> &str {
        match self {
            InventoryEvent::Manufacturing(e) => &e.bill_id,
            InventoryEvent::Cost(e) => &e.bill_id,
            InventoryEvent::BrandCost(e) => &e.bill_id,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            InventoryEvent::Manufacturing(_) => 0,
            InventoryEvent::Cost(_) | InventoryEvent::BrandCost(_) => 1,
        }
    }
}

/// Orders events by date, manufacturing first on the same date. Stable.
pub fn sort_events(events: &mut [InventoryEvent]) {
    events.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.kind_rank().cmp(&b.kind_rank()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mfg(day: u32, sku: &str) -> InventoryEvent {
        InventoryEvent::Manufacturing(ManufacturingEvent {
            date: date(2024, 3, day),
            po_number: "PO-1".to_string(),
            sku: sku.to_string(),
            units: 10,
            cost_cents: 1000,
            bill_id: "b1".to_string(),
        })
    }

    fn freight(day: u32) -> InventoryEvent {
        InventoryEvent::Cost(CostEvent {
            date: date(2024, 3, day),
            po_number: "PO-1".to_string(),
            component: Component::Freight,
            cost_cents: 250,
            sku: None,
            bill_id: "b2".to_string(),
        })
    }

    #[test]
    fn component_from_str_accepts_common_spellings() {
        assert_eq!("freight".parse::<Component>(), Ok(Component::Freight));
        assert_eq!("mfgAccessories".parse::<Component>(), Ok(Component::MfgAccessories));
        assert_eq!("mfg_accessories".parse::<Component>(), Ok(Component::MfgAccessories));
        assert_eq!("Manufacturing".parse::<Component>(), Ok(Component::Manufacturing));
        assert!("shipping".parse::<Component>().is_err());
    }

    #[test]
    fn component_display_round_trips() {
        for c in Component::ALL {
            assert_eq!(c.to_string().parse::<Component>(), Ok(c));
        }
    }

    #[test]
    fn sort_puts_manufacturing_first_on_tied_date() {
        let mut events = vec![freight(5), mfg(5, "A"), freight(1), mfg(9, "B")];
        sort_events(&mut events);
        let kinds: Vec<(u32, Component)> = events
            .iter()
            .map(|e| (chrono::Datelike::day(&e.date()), e.component()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (1, Component::Freight),
                (5, Component::Manufacturing),
                (5, Component::Freight),
                (9, Component::Manufacturing),
            ]
        );
    }

    #[test]
    fn sort_is_stable_within_kind() {
        let mut events = vec![mfg(5, "B"), mfg(5, "A")];
        sort_events(&mut events);
        match (&events[0], &events[1]) {
            (InventoryEvent::Manufacturing(a), InventoryEvent::Manufacturing(b)) => {
                assert_eq!(a.sku, "B");
                assert_eq!(b.sku, "A");
            }
            _ => panic!("expected manufacturing events"),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(freight(2)).unwrap();
        assert_eq!(json["type"], "cost");
        assert_eq!(json["component"], "freight");
        assert_eq!(json["cost_cents"], 250);
    }
}
