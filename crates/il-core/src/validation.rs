//! # Allocation Validator
//!
//! A fixed battery of independent consistency checks over the planning and
//! the allocation results. Each check reports pass/fail with one detail line
//! per offending item. Nothing here blocks a user action: this is a
//! diagnostic report for the organizers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::conflicts::{find_conflicts, ConflictPair};
use crate::models::{Activity, ActivityChoice, Participant, Slot, User};

/// Everything the checks read, as loaded from the stores.
#[derive(Debug, Clone, Default)]
pub struct PlanningSnapshot {
    pub users: Vec<User>,
    pub activities: Vec<Activity>,
    pub slots: Vec<Slot>,
    pub participants: Vec<Participant>,
    pub choices: Vec<ActivityChoice>,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub passed: bool,
    pub message: String,
    pub details: Vec<String>,
}

impl Check {
    fn from_details(details: Vec<String>, success: &str, failure: &str) -> Self {
        let passed = details.is_empty();
        let message = if passed { success } else { failure };
        Self {
            passed,
            message: message.to_string(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    pub conflicts: Vec<ConflictPair>,
    pub checks: Vec<Check>,
}

impl AllocationReport {
    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(|check| !check.passed)
    }
}

/// Lookups shared by the checks. Only current-season rows, except
/// `all_activities` which the season check needs.
struct Index<'a> {
    season: i32,
    users: HashMap<Uuid, &'a User>,
    all_activities: HashMap<Uuid, &'a Activity>,
    activities: HashMap<Uuid, &'a Activity>,
    /// Current-season slots, sorted by id
    slots: Vec<&'a Slot>,
    slots_by_id: HashMap<Uuid, &'a Slot>,
    /// Registered participants with an active account
    participants: HashMap<Uuid, &'a Participant>,
    /// slot id -> participants holding an accepted choice for it
    accepted: HashMap<Uuid, BTreeSet<Uuid>>,
}

impl<'a> Index<'a> {
    fn new(snapshot: &'a PlanningSnapshot, season: i32) -> Self {
        let users: HashMap<Uuid, &User> = snapshot.users.iter().map(|u| (u.id, u)).collect();
        let all_activities: HashMap<Uuid, &Activity> = snapshot.activities.iter().map(|a| (a.id, a)).collect();
        let activities: HashMap<Uuid, &Activity> = all_activities
            .iter()
            .filter(|(_, activity)| activity.year == season)
            .map(|(id, activity)| (*id, *activity))
            .collect();

        let mut slots: Vec<&Slot> = snapshot
            .slots
            .iter()
            .filter(|slot| activities.contains_key(&slot.activity_id))
            .collect();
        slots.sort_by_key(|slot| slot.id);
        let slots_by_id: HashMap<Uuid, &Slot> = slots.iter().map(|slot| (slot.id, *slot)).collect();

        let participants: HashMap<Uuid, &Participant> = snapshot
            .participants
            .iter()
            .filter(|p| p.is_registered)
            .filter(|p| users.get(&p.user_id).is_some_and(|user| user.is_active))
            .map(|p| (p.id, p))
            .collect();

        let mut accepted: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
        for choice in &snapshot.choices {
            if choice.accepted
                && participants.contains_key(&choice.participant_id)
                && slots_by_id.contains_key(&choice.slot_id)
            {
                accepted.entry(choice.slot_id).or_default().insert(choice.participant_id);
            }
        }

        Self {
            season,
            users,
            all_activities,
            activities,
            slots,
            slots_by_id,
            participants,
            accepted,
        }
    }

    fn accepted(&self, slot_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.accepted.get(&slot_id).into_iter().flatten().copied()
    }

    fn activity_of(&self, slot: &Slot) -> Option<&'a Activity> {
        self.activities.get(&slot.activity_id).copied()
    }

    fn slot_label(&self, slot: &Slot) -> String {
        let title = self
            .all_activities
            .get(&slot.activity_id)
            .map_or_else(|| slot.title.clone(), |activity| slot.display_title(activity));
        match slot.start {
            Some(start) => format!("«{}» ({})", title, start.format("%d/%m %H:%M")),
            None => format!("«{title}»"),
        }
    }

    fn slot_label_by_id(&self, slot_id: Uuid) -> String {
        self.slots_by_id
            .get(&slot_id)
            .map_or_else(|| slot_id.to_string(), |slot| self.slot_label(slot))
    }

    fn participant_label(&self, participant_id: Uuid) -> String {
        let Some(participant) = self.participants.get(&participant_id) else {
            return participant_id.to_string();
        };
        let Some(user) = self.users.get(&participant.user_id) else {
            return participant_id.to_string();
        };
        let school = participant
            .school
            .map(|school| school.label().trim_start_matches("ENS ").to_string())
            .unwrap_or_default();
        format!("{} {} ({})", user.first_name, user.last_name, school)
    }

    /// Current-season activities sorted by title, then id.
    fn sorted_activities(&self) -> Vec<&'a Activity> {
        let mut activities: Vec<&Activity> = self.activities.values().copied().collect();
        activities.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        activities
    }
}

/// Runs every check against the given season.
pub fn validate(snapshot: &PlanningSnapshot, season: i32) -> AllocationReport {
    let index = Index::new(snapshot, season);
    let conflicts = find_conflicts(&snapshot.slots, &index.activities);

    let checks = vec![
        check_capacity(&index),
        check_double_booking(&index, &conflicts),
        check_host_clash(&index, &conflicts),
        check_duplicate_activity(&index),
        check_listed_activities_have_slots(&index, snapshot),
        check_season_consistency(&index, snapshot),
        check_subscription_parity(&index),
    ];

    let failed = checks.iter().filter(|check| !check.passed).count();
    tracing::info!(season, conflicts = conflicts.len(), failed, "allocation validated");

    AllocationReport { conflicts, checks }
}

fn check_capacity(index: &Index<'_>) -> Check {
    let mut details = Vec::new();
    for slot in index.slots.iter().filter(|slot| slot.subscribing_open) {
        let Some(activity) = index.activity_of(slot) else { continue };
        let count = index.accepted(slot.id).count();
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        if activity.max_participants != 0 && count > activity.max_participants {
            details.push(format!(
                "{} : {} participants pour un maximum de {}",
                index.slot_label(slot),
                count,
                activity.max_participants
            ));
        }
        if count < activity.min_participants {
            details.push(format!(
                "{} : {} participants pour un minimum de {}",
                index.slot_label(slot),
                count,
                activity.min_participants
            ));
        }
    }
    Check::from_details(
        details,
        "Tous les créneaux respectent leur nombre de participants",
        "Certains créneaux ont trop ou pas assez de participants :",
    )
}

fn check_double_booking(index: &Index<'_>, conflicts: &[ConflictPair]) -> Check {
    let mut details = Vec::new();
    for pair in conflicts {
        let first: BTreeSet<Uuid> = index.accepted(pair.first).collect();
        for participant in index.accepted(pair.second).filter(|p| first.contains(p)) {
            details.push(format!(
                "{} a obtenu {} et {} qui se chevauchent",
                index.participant_label(participant),
                index.slot_label_by_id(pair.first),
                index.slot_label_by_id(pair.second)
            ));
        }
    }
    Check::from_details(
        details,
        "Aucun participant n'est inscrit à deux créneaux simultanés",
        "Certains participants sont inscrits à des créneaux simultanés :",
    )
}

/// Only the primary host of an activity is checked, not additional hosts.
fn check_host_clash(index: &Index<'_>, conflicts: &[ConflictPair]) -> Check {
    let mut details = Vec::new();
    for pair in conflicts {
        for (attended, hosted) in [(pair.first, pair.second), (pair.second, pair.first)] {
            let Some(host_id) = index
                .slots_by_id
                .get(&hosted)
                .and_then(|slot| index.activity_of(slot))
                .and_then(|activity| activity.host_id)
            else {
                continue;
            };
            for participant in index.accepted(attended) {
                if index.participants.get(&participant).is_some_and(|p| p.user_id == host_id) {
                    details.push(format!(
                        "{} participe à {} mais organise {}",
                        index.participant_label(participant),
                        index.slot_label_by_id(attended),
                        index.slot_label_by_id(hosted)
                    ));
                }
            }
        }
    }
    Check::from_details(
        details,
        "Aucun organisateur ne participe à une activité pendant la sienne",
        "Certains organisateurs participent à une activité pendant la leur :",
    )
}

fn check_duplicate_activity(index: &Index<'_>) -> Check {
    let mut open_by_activity: BTreeMap<Uuid, Vec<&Slot>> = BTreeMap::new();
    for slot in index.slots.iter().filter(|slot| slot.subscribing_open) {
        open_by_activity.entry(slot.activity_id).or_default().push(slot);
    }

    let mut details = Vec::new();
    for (activity_id, slots) in open_by_activity.iter().filter(|(_, slots)| slots.len() > 1) {
        let mut per_participant: BTreeMap<Uuid, usize> = BTreeMap::new();
        for slot in slots {
            for participant in index.accepted(slot.id) {
                *per_participant.entry(participant).or_default() += 1;
            }
        }
        let title = index.activities.get(activity_id).map_or("", |a| a.title.as_str());
        for (participant, count) in per_participant.into_iter().filter(|(_, count)| *count > 1) {
            details.push(format!(
                "{} a obtenu {} créneaux de «{}»",
                index.participant_label(participant),
                count,
                title
            ));
        }
    }
    Check::from_details(
        details,
        "Aucun participant n'a obtenu deux créneaux d'une même activité",
        "Certains participants ont obtenu plusieurs créneaux d'une même activité :",
    )
}

fn check_listed_activities_have_slots(index: &Index<'_>, snapshot: &PlanningSnapshot) -> Check {
    let with_slots: BTreeSet<Uuid> = snapshot.slots.iter().map(|slot| slot.activity_id).collect();
    let details = index
        .sorted_activities()
        .into_iter()
        .filter(|activity| activity.display && activity.communicate_participants)
        .filter(|activity| !with_slots.contains(&activity.id))
        .map(|activity| format!("«{}» demande la liste des participants mais n'a aucun créneau", activity.title))
        .collect();
    Check::from_details(
        details,
        "Toutes les activités demandant la liste des participants ont des créneaux",
        "Certaines activités demandant la liste des participants n'ont pas de créneau :",
    )
}

fn check_season_consistency(index: &Index<'_>, snapshot: &PlanningSnapshot) -> Check {
    let mut details = Vec::new();

    for activity in snapshot.activities.iter().filter(|a| a.display && a.year < index.season) {
        details.push(format!(
            "«{}» est affichée mais appartient à l'édition {}",
            activity.title, activity.year
        ));
    }

    let mut planning: Vec<&Slot> = snapshot.slots.iter().filter(|slot| slot.on_planning).collect();
    planning.sort_by_key(|slot| slot.id);
    for slot in planning {
        let Some(activity) = index.all_activities.get(&slot.activity_id) else { continue };
        if activity.year < index.season {
            details.push(format!(
                "{} est sur le planning mais son activité appartient à l'édition {}",
                index.slot_label(slot),
                activity.year
            ));
        } else if activity.year == index.season && !activity.display {
            details.push(format!(
                "{} est sur le planning mais son activité n'est pas affichée",
                index.slot_label(slot)
            ));
        }
    }

    for activity in index.sorted_activities().into_iter().filter(|a| a.display) {
        let realized = index
            .slots
            .iter()
            .filter(|slot| slot.activity_id == activity.id && slot.on_activity)
            .count();
        if u32::try_from(realized).ok() != Some(activity.desired_slot_nb) {
            details.push(format!(
                "«{}» souhaite {} créneaux mais en a {}",
                activity.title, activity.desired_slot_nb, realized
            ));
        }
    }

    Check::from_details(
        details,
        "Le planning et les activités affichées sont cohérents",
        "Le planning et les activités affichées sont incohérents :",
    )
}

fn check_subscription_parity(index: &Index<'_>) -> Check {
    let details = index
        .slots
        .iter()
        .filter_map(|slot| {
            let activity = index.activity_of(slot)?;
            (slot.subscribing_open != activity.must_subscribe).then(|| {
                if slot.subscribing_open {
                    format!("{} est ouvert aux inscriptions mais pas son activité", index.slot_label(slot))
                } else {
                    format!("{} est fermé aux inscriptions mais son activité est sur inscription", index.slot_label(slot))
                }
            })
        })
        .collect();
    Check::from_details(
        details,
        "Les inscriptions des créneaux correspondent à celles des activités",
        "Les inscriptions de certains créneaux ne correspondent pas à leur activité :",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Color, School};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    const SEASON: i32 = 2025;

    // Index of each check in `AllocationReport::checks`
    const CAPACITY: usize = 0;
    const DOUBLE_BOOKING: usize = 1;
    const HOST_CLASH: usize = 2;
    const DUPLICATE: usize = 3;
    const LISTED: usize = 4;
    const SEASON_CHECK: usize = 5;
    const PARITY: usize = 6;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 8, hour, minute, 0).unwrap()
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn user(n: u128, first_name: &str) -> User {
        User {
            id: id(n),
            email: format!("{first_name}@example.org"),
            first_name: first_name.into(),
            last_name: "Test".into(),
            is_active: true,
            is_superuser: false,
            last_login: None,
        }
    }

    fn participant(n: u128, user_id: u128) -> Participant {
        Participant {
            id: id(n),
            user_id: id(user_id),
            school: Some(School::Ulm),
            is_registered: true,
            paid: false,
            sleeps: false,
            meals: BTreeSet::new(),
            options: BTreeSet::new(),
        }
    }

    fn activity(n: u128, title: &str) -> Activity {
        Activity {
            id: id(n),
            title: title.into(),
            display: true,
            year: SEASON,
            host_id: None,
            host_name: None,
            host_email: "host@example.org".into(),
            must_subscribe: true,
            communicate_participants: false,
            max_participants: 0,
            min_participants: 0,
            duration: Some(TimeDelta::hours(1)),
            desired_slot_nb: 1,
        }
    }

    fn slot(n: u128, activity_id: u128, start: DateTime<Utc>) -> Slot {
        Slot {
            id: id(n),
            activity_id: id(activity_id),
            title: "{act_title}".into(),
            start: Some(start),
            duration: None,
            room: None,
            on_planning: true,
            on_activity: true,
            subscribing_open: true,
            color: Color::Blue,
        }
    }

    fn accepted(participant_id: u128, slot_id: u128, priority: u32) -> ActivityChoice {
        ActivityChoice {
            participant_id: id(participant_id),
            slot_id: id(slot_id),
            priority,
            accepted: true,
        }
    }

    /// S1 (10:00-11:00) and S2 (10:30-11:30) of two different activities,
    /// participant P accepted to both.
    fn overlapping_snapshot() -> PlanningSnapshot {
        PlanningSnapshot {
            users: vec![user(100, "paul")],
            activities: vec![activity(1, "Murder"), activity(2, "Tournoi")],
            slots: vec![slot(11, 1, at(10, 0)), slot(12, 2, at(10, 30))],
            participants: vec![participant(200, 100)],
            choices: vec![accepted(200, 11, 1), accepted(200, 12, 2)],
        }
    }

    #[test]
    fn test_empty_state_passes_everything() {
        let report = validate(&PlanningSnapshot::default(), SEASON);
        assert_eq!(report.checks.len(), 7);
        assert!(report.checks.iter().all(|check| check.passed && check.details.is_empty()));
        assert!(!report.has_errors());
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn test_end_to_end_double_booking() {
        let report = validate(&overlapping_snapshot(), SEASON);

        assert_eq!(report.conflicts, vec![ConflictPair { first: id(11), second: id(12) }]);
        let check = &report.checks[DOUBLE_BOOKING];
        assert!(!check.passed);
        assert_eq!(check.details.len(), 1);
        assert!(check.details[0].contains("paul Test"));
        assert!(report.has_errors());
    }

    #[test]
    fn test_double_booking_passes_when_one_choice_not_accepted() {
        let mut snapshot = overlapping_snapshot();
        snapshot.choices[1].accepted = false;

        let report = validate(&snapshot, SEASON);
        assert!(report.checks[DOUBLE_BOOKING].passed);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_unregistered_participant_does_not_count() {
        let mut snapshot = overlapping_snapshot();
        snapshot.participants[0].is_registered = false;

        assert!(validate(&snapshot, SEASON).checks[DOUBLE_BOOKING].passed);
    }

    #[test]
    fn test_inactive_user_does_not_count() {
        let mut snapshot = overlapping_snapshot();
        snapshot.users[0].is_active = false;

        assert!(validate(&snapshot, SEASON).checks[DOUBLE_BOOKING].passed);
    }

    #[test]
    fn test_capacity_bounds() {
        let mut snapshot = PlanningSnapshot {
            users: (1..=3).map(|n| user(100 + n, "u")).collect(),
            activities: vec![Activity { max_participants: 2, ..activity(1, "Loup-garou") }],
            slots: vec![slot(11, 1, at(14, 0))],
            participants: (1..=3).map(|n| participant(200 + n, 100 + n)).collect(),
            choices: (1..=3).map(|n| accepted(200 + n, 11, 1)).collect(),
        };

        let report = validate(&snapshot, SEASON);
        assert!(!report.checks[CAPACITY].passed);
        assert!(report.checks[CAPACITY].details[0].contains("3 participants pour un maximum de 2"));

        snapshot.choices.pop();
        assert!(validate(&snapshot, SEASON).checks[CAPACITY].passed);
    }

    #[test]
    fn test_capacity_minimum() {
        let snapshot = PlanningSnapshot {
            activities: vec![Activity { min_participants: 4, ..activity(1, "JdR") }],
            slots: vec![slot(11, 1, at(14, 0))],
            ..PlanningSnapshot::default()
        };

        let check = &validate(&snapshot, SEASON).checks[CAPACITY];
        assert!(!check.passed);
        assert!(check.details[0].contains("pour un minimum de 4"));
    }

    #[test]
    fn test_host_clash_is_checked_both_ways() {
        let mut snapshot = overlapping_snapshot();
        // paul hosts activity 2 and attends slot 11 of activity 1
        snapshot.activities[1].host_id = Some(id(100));
        snapshot.choices = vec![accepted(200, 11, 1)];

        let check = &validate(&snapshot, SEASON).checks[HOST_CLASH];
        assert!(!check.passed);
        assert!(check.details[0].contains("organise"));

        // mirrored: paul hosts activity 1 and attends slot 12
        let mut snapshot = overlapping_snapshot();
        snapshot.activities[0].host_id = Some(id(100));
        snapshot.choices = vec![accepted(200, 12, 1)];
        assert!(!validate(&snapshot, SEASON).checks[HOST_CLASH].passed);
    }

    #[test]
    fn test_host_clash_ignores_disjoint_slots() {
        let mut snapshot = overlapping_snapshot();
        snapshot.slots[1].start = Some(at(15, 0));
        snapshot.activities[1].host_id = Some(id(100));
        snapshot.choices = vec![accepted(200, 11, 1)];

        assert!(validate(&snapshot, SEASON).checks[HOST_CLASH].passed);
    }

    #[test]
    fn test_duplicate_activity_registration() {
        let mut snapshot = PlanningSnapshot {
            users: vec![user(100, "paul")],
            activities: vec![Activity { desired_slot_nb: 2, ..activity(1, "Escape game") }],
            slots: vec![slot(11, 1, at(10, 0)), slot(12, 1, at(16, 0))],
            participants: vec![participant(200, 100)],
            choices: vec![accepted(200, 11, 1), accepted(200, 12, 2)],
        };

        let check = &validate(&snapshot, SEASON).checks[DUPLICATE];
        assert!(!check.passed);
        assert!(check.details[0].contains("2 créneaux de «Escape game»"));

        snapshot.choices.pop();
        let report = validate(&snapshot, SEASON);
        assert!(report.checks[DUPLICATE].passed);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_listed_activity_without_slot() {
        let snapshot = PlanningSnapshot {
            activities: vec![Activity { communicate_participants: true, ..activity(1, "Murder") }],
            ..PlanningSnapshot::default()
        };

        let check = &validate(&snapshot, SEASON).checks[LISTED];
        assert!(!check.passed);
        assert_eq!(check.details.len(), 1);
    }

    #[test]
    fn test_past_season_displayed_activity_is_flagged() {
        let snapshot = PlanningSnapshot {
            activities: vec![Activity { year: SEASON - 1, must_subscribe: false, ..activity(1, "Vieux jeu") }],
            ..PlanningSnapshot::default()
        };

        let report = validate(&snapshot, SEASON);
        let check = &report.checks[SEASON_CHECK];
        assert!(!check.passed);
        assert!(check.details[0].contains("2024"));
        // past-season rows take no part in the other checks
        assert!(report
            .checks
            .iter()
            .enumerate()
            .all(|(i, check)| i == SEASON_CHECK || check.passed));
    }

    #[test]
    fn test_planning_slot_of_hidden_activity() {
        let snapshot = PlanningSnapshot {
            activities: vec![Activity { display: false, ..activity(1, "Cachée") }],
            slots: vec![slot(11, 1, at(9, 0))],
            ..PlanningSnapshot::default()
        };

        let check = &validate(&snapshot, SEASON).checks[SEASON_CHECK];
        assert!(!check.passed);
        assert!(check.details[0].contains("n'est pas affichée"));
    }

    #[test]
    fn test_slot_count_mismatch() {
        let snapshot = PlanningSnapshot {
            activities: vec![Activity { desired_slot_nb: 3, ..activity(1, "Tournoi") }],
            slots: vec![slot(11, 1, at(9, 0))],
            ..PlanningSnapshot::default()
        };

        let check = &validate(&snapshot, SEASON).checks[SEASON_CHECK];
        assert_eq!(check.details, vec!["«Tournoi» souhaite 3 créneaux mais en a 1".to_string()]);
    }

    #[test]
    fn test_subscription_flag_parity() {
        let mut snapshot = PlanningSnapshot {
            activities: vec![Activity { must_subscribe: false, ..activity(1, "Freeplay") }],
            slots: vec![slot(11, 1, at(9, 0))],
            ..PlanningSnapshot::default()
        };

        assert!(!validate(&snapshot, SEASON).checks[PARITY].passed);

        snapshot.slots[0].subscribing_open = false;
        assert!(validate(&snapshot, SEASON).checks[PARITY].passed);
    }
}
