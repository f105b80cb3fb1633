//! # Domain Models
//!
//! These structs represent the core entities of the Interludes registration
//! site: activities proposed by hosts, the slots that place them on the
//! planning, participants, and their ranked slot choices.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Placeholder replaced by the activity title in [`Slot::title`].
pub const TITLE_SPECIFIER: &str = "{act_title}";

/// An account on the site, identified by its email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
}

/// Links a [`User`] to the CAS identity it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasAccount {
    pub user_id: Uuid,
    /// `"<login>#<homedir>"`; CAS logins alone are recycled across years.
    pub unique_id: String,
    pub cas_login: String,
}

/// An event-program item (e.g. a tabletop RPG session, a tournament).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    /// Visible on the public activity list
    pub display: bool,
    /// Registration season this activity belongs to (e.g. 2025 for 2024-2025)
    pub year: i32,
    pub host_id: Option<Uuid>,
    pub host_name: Option<String>,
    pub host_email: String,
    pub must_subscribe: bool,
    /// The host wants the participant list before the event
    pub communicate_participants: bool,
    /// 0 means unbounded
    pub max_participants: u32,
    pub min_participants: u32,
    #[serde(default, with = "duration_secs")]
    pub duration: Option<TimeDelta>,
    pub desired_slot_nb: u32,
}

impl Activity {
    /// Human readable participant bounds, as shown on the activity list.
    pub fn nb_participants(&self) -> String {
        let mut ret = if self.max_participants == 0 {
            "Illimités".to_string()
        } else if self.max_participants == self.min_participants {
            self.min_participants.to_string()
        } else {
            format!("{} - {}", self.min_participants, self.max_participants)
        };
        if self.must_subscribe {
            ret.push_str(" (sur inscription)");
        }
        ret
    }

    /// `1h30`, `2h`, ... Empty when the duration is unknown.
    pub fn pretty_duration(&self) -> String {
        let Some(duration) = self.duration else {
            return String::new();
        };
        let total = duration.num_seconds();
        let (hours, rem) = (total / 3600, total % 3600);
        let minutes = rem / 60;
        if minutes == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h{minutes:02}")
        }
    }

    /// Anchor used by the planning page.
    pub fn slug(&self) -> String {
        format!("act-{}", self.id)
    }
}

/// Display color of a slot on the planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    #[default]
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    DarkBlue,
    Black,
}

impl Color {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Red => "a",
            Self::Orange => "b",
            Self::Yellow => "c",
            Self::Green => "d",
            Self::Blue => "e",
            Self::DarkBlue => "f",
            Self::Black => "g",
        }
    }
}

impl FromStr for Color {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "a" => Self::Red,
            "b" => Self::Orange,
            "c" => Self::Yellow,
            "d" => Self::Green,
            "e" => Self::Blue,
            "f" => Self::DarkBlue,
            "g" => Self::Black,
            other => return Err(AppError::ValidationError(format!("unknown color code {other:?}"))),
        })
    }
}

/// A scheduled time window for (part of) an [`Activity`].
///
/// Registrations are made to slots, not to activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub activity_id: Uuid,
    /// May contain [`TITLE_SPECIFIER`]
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    /// Falls back to the activity duration when absent
    #[serde(default, with = "duration_secs")]
    pub duration: Option<TimeDelta>,
    pub room: Option<String>,
    pub on_planning: bool,
    pub on_activity: bool,
    pub subscribing_open: bool,
    pub color: Color,
}

impl Slot {
    /// End of the slot, if both a start and some duration are known.
    pub fn end(&self, activity: &Activity) -> Option<DateTime<Utc>> {
        let start = self.start?;
        let duration = self.duration.or(activity.duration)?;
        start.checked_add_signed(duration)
    }

    pub fn display_title(&self, activity: &Activity) -> String {
        self.title.replace(TITLE_SPECIFIER, &activity.title)
    }

    /// Day index relative to the event start, where each day runs from 04:00
    /// to 03:59 the next morning. Returns 0 when no start date is configured.
    pub fn relative_day(settings: &SiteSettings, at: DateTime<Utc>) -> i64 {
        let Some(origin) = settings
            .date_start
            .and_then(|date| date.and_hms_opt(4, 0, 0))
            .map(|naive| naive.and_utc())
        else {
            return 0;
        };
        (at - origin).num_seconds().div_euclid(86_400)
    }

    /// Every relative day this slot touches, start day to end day inclusive.
    pub fn days(&self, activity: &Activity, settings: &SiteSettings) -> Vec<i64> {
        let (Some(start), Some(end)) = (self.start, self.end(activity)) else {
            return Vec::new();
        };
        (Self::relative_day(settings, start)..=Self::relative_day(settings, end)).collect()
    }
}

/// School a participant is affiliated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum School {
    Ulm,
    Lyon,
    Rennes,
    Saclay,
}

impl School {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ulm => "U",
            Self::Lyon => "L",
            Self::Rennes => "R",
            Self::Saclay => "C",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ulm => "ENS Ulm",
            Self::Lyon => "ENS Lyon",
            Self::Rennes => "ENS Rennes",
            Self::Saclay => "ENS Paris Saclay",
        }
    }
}

impl FromStr for School {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "U" => Self::Ulm,
            "L" => Self::Lyon,
            "R" => Self::Rennes,
            "C" => Self::Saclay,
            other => return Err(AppError::ValidationError(format!("unknown school code {other:?}"))),
        })
    }
}

/// Meals served during the event, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Meal {
    FridayEvening,
    SaturdayMorning,
    SaturdayMidday,
    SaturdayEvening,
    SundayMorning,
    SundayMidday,
    SundayEvening,
}

impl Meal {
    pub const ALL: [Self; 7] = [
        Self::FridayEvening,
        Self::SaturdayMorning,
        Self::SaturdayMidday,
        Self::SaturdayEvening,
        Self::SundayMorning,
        Self::SundayMidday,
        Self::SundayEvening,
    ];
}

/// Number of purchasable extras configurable in [`SiteSettings`].
pub const OPTION_COUNT: u8 = 5;

/// A registered user eligible to request slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub school: Option<School>,
    /// Choices of unregistered participants do not count.
    pub is_registered: bool,
    /// Salaried participants pay the "paid" price tier.
    pub paid: bool,
    pub sleeps: bool,
    pub meals: BTreeSet<Meal>,
    /// Chosen option numbers, 1 to [`OPTION_COUNT`]
    pub options: BTreeSet<u8>,
}

impl Participant {
    pub fn cost_entry(&self, settings: &SiteSettings) -> Decimal {
        settings.price_entry.for_tier(self.paid)
    }

    pub fn cost_sleep(&self, settings: &SiteSettings) -> Decimal {
        if self.sleeps {
            settings.price_sleep.for_tier(self.paid)
        } else {
            Decimal::ZERO
        }
    }

    pub fn cost_meals(&self, settings: &SiteSettings) -> Decimal {
        self.meals
            .iter()
            .filter_map(|meal| settings.meals.get(meal))
            .filter(|setting| setting.enabled)
            .map(|setting| setting.price.for_tier(self.paid))
            .sum()
    }

    pub fn cost_options(&self, settings: &SiteSettings) -> Decimal {
        self.options
            .iter()
            .filter_map(|option| settings.options.get(option))
            .filter(|setting| setting.enabled)
            .map(|setting| setting.price.for_tier(self.paid))
            .sum()
    }

    /// Total registration price.
    pub fn cost(&self, settings: &SiteSettings) -> Decimal {
        self.cost_entry(settings)
            + self.cost_meals(settings)
            + self.cost_sleep(settings)
            + self.cost_options(settings)
    }
}

/// A participant's request for a slot, ranked by priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityChoice {
    pub participant_id: Uuid,
    pub slot_id: Uuid,
    pub priority: u32,
    /// Set by the (external) allocation process
    pub accepted: bool,
}

/// Checks the uniqueness invariants of a batch of choices:
/// one choice per (participant, priority) and per (participant, slot).
pub fn validate_choices(choices: &[ActivityChoice]) -> crate::error::Result<()> {
    let mut priorities = BTreeSet::new();
    let mut slots = BTreeSet::new();
    for choice in choices {
        if !priorities.insert((choice.participant_id, choice.priority)) {
            return Err(AppError::ValidationError(format!(
                "participant {} has two choices with priority {}",
                choice.participant_id, choice.priority
            )));
        }
        if !slots.insert((choice.participant_id, choice.slot_id)) {
            return Err(AppError::ValidationError(format!(
                "participant {} chose slot {} twice",
                choice.participant_id, choice.slot_id
            )));
        }
    }
    Ok(())
}

/// Price pair for the two participant tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Price {
    pub paid: Decimal,
    pub unpaid: Decimal,
}

impl Price {
    pub const fn for_tier(&self, paid: bool) -> Decimal {
        if paid {
            self.paid
        } else {
            self.unpaid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSetting {
    pub enabled: bool,
    pub price: Price,
}

impl Default for MealSetting {
    fn default() -> Self {
        Self { enabled: true, price: Price::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OptionSetting {
    pub enabled: bool,
    pub description: String,
    pub price: Price,
}

/// Site-wide settings, one record per deployment.
///
/// Loaded through [`crate::traits::PlanningRepo::load_settings`] and passed
/// explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub contact_email: Option<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub price_entry: Price,
    pub price_sleep: Price,
    pub meals: BTreeMap<Meal, MealSetting>,
    pub options: BTreeMap<u8, OptionSetting>,
    pub activity_submission_open: bool,
    pub allow_mass_mail: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            contact_email: None,
            date_start: None,
            date_end: None,
            price_entry: Price::default(),
            price_sleep: Price::default(),
            meals: Meal::ALL.into_iter().map(|meal| (meal, MealSetting::default())).collect(),
            options: (1..=OPTION_COUNT).map(|option| (option, OptionSetting::default())).collect(),
            activity_submission_open: false,
            allow_mass_mail: false,
        }
    }
}

impl SiteSettings {
    pub fn any_meal(&self) -> bool {
        self.meals.values().any(|setting| setting.enabled)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Serializes optional durations as whole seconds.
mod duration_secs {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TimeDelta>, D::Error> {
        Ok(Option::<i64>::deserialize(deserializer)?.and_then(TimeDelta::try_seconds))
    }
}
