use anyhow::Context as _;
use chrono::{DateTime, Duration, Months, Utc};

use crate::cli::{ScheduleAddArgs, StoreArgs};
use crate::model::{PublicationSchedule, ScheduleFrequency, new_id};
use crate::store::{LocalFsStore, PersonaStore, PublishingStore};

impl ScheduleFrequency {
    pub fn next_after(self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleFrequency::Daily => from + Duration::days(1),
            ScheduleFrequency::Weekly => from + Duration::weeks(1),
            ScheduleFrequency::Biweekly => from + Duration::weeks(2),
            // Month-end dates clamp (Jan 31 -> Feb 28/29).
            ScheduleFrequency::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or(from + Duration::days(30)),
        }
    }
}

pub fn is_due(schedule: &PublicationSchedule, now: DateTime<Utc>) -> bool {
    schedule.is_active && schedule.next_run_at <= now
}

/// Records a run at `now` and moves `next_run_at` to the first slot after it.
/// Missed periods are skipped, not replayed.
pub fn advance_next_run(schedule: &mut PublicationSchedule, now: DateTime<Utc>) {
    schedule.last_run_at = Some(now);
    let mut next = schedule.next_run_at;
    while next <= now {
        next = schedule.frequency.next_after(next);
    }
    schedule.next_run_at = next;
}

pub async fn add(args: ScheduleAddArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.data_dir);
    let template = store
        .get_template(&args.template_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("template not found: {}", args.template_id))?;
    if template.site_id != args.site_id {
        anyhow::bail!(
            "template {} belongs to site {}, not {}",
            template.id,
            template.site_id,
            args.site_id
        );
    }
    if store.get_site(&args.site_id).await?.is_none() {
        anyhow::bail!("site not found: {}", args.site_id);
    }
    if let Some(persona_id) = &args.persona_id
        && store.get_persona(persona_id).await?.is_none()
    {
        anyhow::bail!("persona not found: {persona_id}");
    }

    let next_run_at = match &args.start_at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("parse --start-at: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let schedule = PublicationSchedule {
        id: new_id(),
        site_id: args.site_id,
        template_id: args.template_id,
        persona_id: args.persona_id,
        frequency: args.frequency,
        is_active: true,
        next_run_at,
        last_run_at: None,
        blog_analysis: None,
        post_status: args.post_status,
    };
    store.put_schedule(&schedule).await.context("save schedule")?;
    println!("{}", schedule.id);
    Ok(())
}

pub async fn list(args: StoreArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.data_dir);
    let mut schedules = store.list_schedules().await?;
    schedules.sort_by_key(|s| s.next_run_at);
    for s in schedules {
        println!(
            "{}\t{:?}\t{}\tnext={}\tanalysis={}",
            s.id,
            s.frequency,
            if s.is_active { "active" } else { "paused" },
            s.next_run_at.to_rfc3339(),
            if s.blog_analysis.is_some() { "yes" } else { "no" },
        );
    }
    Ok(())
}
