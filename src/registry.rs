//! Read-only product registry.
//! Maps a Tuya `(category, product_id)` pair to the product name and its entity descriptors.

use crate::datapoint::{DpId, DpType, TIMER_DP_ID};
use crate::timer::{TimerField, Weekday};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Entity platform together with its presentation limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum Platform {
    Number {
        min: f64,
        max: f64,
        step: f64,
        unit: Option<&'static str>,
    },
    Sensor {
        unit: Option<&'static str>,
        options: &'static [&'static str],
    },
    Switch,
    Text,
}

/// What an entity reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "binding", content = "target", rename_all = "snake_case")]
pub enum Binding {
    /// The datapoint value itself
    Datapoint,
    /// One scalar of the timer record
    TimerField(TimerField),
    /// One day of the timer record
    TimerDay(Weekday),
    /// Armed flag of the timer record
    TimerEnabled,
    /// The whole timer datapoint as base64 text
    TimerRaw,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDescriptor {
    pub key: &'static str,
    pub name: Option<&'static str>,
    pub dp_id: DpId,
    pub dp_type: DpType,
    pub platform: Platform,
    pub binding: Binding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductInfo {
    pub name: &'static str,
    pub entities: Vec<EntityDescriptor>,
}

impl ProductInfo {
    /// Whether any entity is bound to the timer record.
    pub fn has_timer(&self) -> bool {
        self.timer_entities().next().is_some()
    }

    pub fn timer_entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities
            .iter()
            .filter(|e| !matches!(e.binding, Binding::Datapoint))
    }

    /// Declared type of every datapoint used by this product, deduplicated by id.
    pub fn datapoint_kinds(&self) -> Vec<(DpId, DpType)> {
        let mut kinds: Vec<(DpId, DpType)> = Vec::new();
        for entity in &self.entities {
            if !kinds.iter().any(|(id, _)| *id == entity.dp_id) {
                kinds.push((entity.dp_id, entity.dp_type));
            }
        }
        kinds.sort_by_key(|(id, _)| *id);
        kinds
    }
}

/// Products of one category, keyed by product id.
type CategoryProducts = HashMap<&'static str, ProductInfo>;

static PRODUCT_REGISTRY: OnceLock<HashMap<&'static str, CategoryProducts>> = OnceLock::new();

/// Looks up a product by category and product id.
pub fn lookup(category: &str, product_id: &str) -> Option<&'static ProductInfo> {
    PRODUCT_REGISTRY
        .get_or_init(build_registry)
        .get(category)?
        .get(product_id)
}

fn timer_number(
    key: &'static str,
    name: &'static str,
    field: TimerField,
    min: f64,
    max: f64,
) -> EntityDescriptor {
    EntityDescriptor {
        key,
        name: Some(name),
        dp_id: TIMER_DP_ID,
        dp_type: DpType::Raw,
        platform: Platform::Number {
            min,
            max,
            step: 1.0,
            unit: None,
        },
        binding: Binding::TimerField(field),
    }
}

fn timer_day(day: Weekday) -> EntityDescriptor {
    let key = match day {
        Weekday::Sun => "timer_sun",
        Weekday::Mon => "timer_mon",
        Weekday::Tue => "timer_tue",
        Weekday::Wed => "timer_wed",
        Weekday::Thu => "timer_thu",
        Weekday::Fri => "timer_fri",
        Weekday::Sat => "timer_sat",
    };
    EntityDescriptor {
        key,
        name: None,
        dp_id: TIMER_DP_ID,
        dp_type: DpType::Raw,
        platform: Platform::Switch,
        binding: Binding::TimerDay(day),
    }
}

fn sensor(
    key: &'static str,
    dp_id: DpId,
    dp_type: DpType,
    unit: Option<&'static str>,
    options: &'static [&'static str],
) -> EntityDescriptor {
    EntityDescriptor {
        key,
        name: None,
        dp_id,
        dp_type,
        platform: Platform::Sensor { unit, options },
        binding: Binding::Datapoint,
    }
}

fn irrigation_controller() -> ProductInfo {
    let mut entities = vec![
        sensor("work_state", 12, DpType::Enum, None, &["auto", "manual", "idle"]),
        sensor("battery_state", 8, DpType::Enum, None, &["low", "middle", "high"]),
        sensor("battery_percentage", 7, DpType::Value, Some("%"), &[]),
        sensor("use_time_one", 15, DpType::Value, Some("s"), &[]),
        EntityDescriptor {
            key: "countdown",
            name: Some("Countdown"),
            dp_id: 11,
            dp_type: DpType::Value,
            platform: Platform::Number {
                min: 0.0,
                max: 86400.0,
                step: 1.0,
                unit: Some("s"),
            },
            binding: Binding::Datapoint,
        },
        timer_number("timer_hour", "Timer Hour", TimerField::Hour, 0.0, 23.0),
        timer_number("timer_minute", "Timer Minute", TimerField::Minute, 0.0, 59.0),
        timer_number("timer_duration", "Timer Duration", TimerField::Duration, 1.0, 1439.0),
        EntityDescriptor {
            key: "timer_enabled",
            name: Some("Timer Enabled"),
            dp_id: TIMER_DP_ID,
            dp_type: DpType::Raw,
            platform: Platform::Switch,
            binding: Binding::TimerEnabled,
        },
        EntityDescriptor {
            key: "timer_raw",
            name: Some("Timer RAW (base64)"),
            dp_id: TIMER_DP_ID,
            dp_type: DpType::Raw,
            platform: Platform::Text,
            binding: Binding::TimerRaw,
        },
    ];
    entities.extend(Weekday::ALL.into_iter().map(timer_day));
    ProductInfo {
        name: "ZX-7378 Smart Irrigation Controller",
        entities,
    }
}

fn build_registry() -> HashMap<&'static str, CategoryProducts> {
    let mut smart_valves = CategoryProducts::new();
    smart_valves.insert(
        "nxquc5lb",
        ProductInfo {
            name: "Smart Water Valve",
            entities: vec![sensor("battery_percentage", 7, DpType::Value, Some("%"), &[])],
        },
    );
    smart_valves.insert("ldcdnigc", irrigation_controller());

    let mut registry = HashMap::new();
    registry.insert("sfkzq", smart_valves);
    registry
}
