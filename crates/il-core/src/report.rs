//! # Admin report
//!
//! Everything the admin dashboard shows, computed in one pass from a
//! [`PlanningSnapshot`].

use serde::Serialize;

use crate::traits::PlanningRepo;
use crate::validation::{validate, AllocationReport, PlanningSnapshot};

/// Headline counters of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdminMetrics {
    /// Active accounts
    pub users: usize,
    /// Activities of the current season
    pub activities: usize,
    pub displayed: usize,
    /// Displayed and registration-only
    pub act_ins: usize,
    /// Slots of current-season activities
    pub slots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminReport {
    pub season: i32,
    pub metrics: AdminMetrics,
    /// Titles of current-season activities missing from the public list
    pub hidden_activities: Vec<String>,
    pub allocation: AllocationReport,
}

impl AdminReport {
    pub fn has_errors(&self) -> bool {
        self.allocation.has_errors()
    }
}

pub fn compute_metrics(snapshot: &PlanningSnapshot, season: i32) -> AdminMetrics {
    let current: Vec<_> = snapshot.activities.iter().filter(|a| a.year == season).collect();
    AdminMetrics {
        users: snapshot.users.iter().filter(|u| u.is_active).count(),
        activities: current.len(),
        displayed: current.iter().filter(|a| a.display).count(),
        act_ins: current.iter().filter(|a| a.display && a.must_subscribe).count(),
        slots: snapshot
            .slots
            .iter()
            .filter(|slot| current.iter().any(|a| a.id == slot.activity_id))
            .count(),
    }
}

pub fn build_admin_report(snapshot: &PlanningSnapshot, season: i32) -> AdminReport {
    let mut hidden: Vec<&str> = snapshot
        .activities
        .iter()
        .filter(|a| a.year == season && !a.display)
        .map(|a| a.title.as_str())
        .collect();
    hidden.sort_unstable();

    AdminReport {
        season,
        metrics: compute_metrics(snapshot, season),
        hidden_activities: hidden.into_iter().map(str::to_string).collect(),
        allocation: validate(snapshot, season),
    }
}

/// Loads the planning from the store and builds the report.
pub async fn load_admin_report(repo: &dyn PlanningRepo, season: i32) -> anyhow::Result<AdminReport> {
    let snapshot = PlanningSnapshot {
        users: repo.list_users().await?,
        activities: repo.list_activities().await?,
        slots: repo.list_slots().await?,
        participants: repo.list_participants().await?,
        choices: repo.list_choices().await?,
    };
    Ok(build_admin_report(&snapshot, season))
}
