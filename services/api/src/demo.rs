use crate::infra::{demo_roster, parse_timestamp, seed_store};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use rollcall::attendance::{
    AttendanceError, AttendanceService, DistrictId, DistrictScope, EventAttendanceSummary,
    EventDraft, EventKind, ScheduleService, SessionDraft, UserId,
};
use rollcall::config::PolicyConfig;
use rollcall::error::AppError;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Reference time for the walkthrough (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Minimum weekly minutes for the demo event.
    #[arg(long, default_value_t = 240)]
    pub(crate) weekly_minimum: u32,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let now = args.now.unwrap_or_else(Utc::now);
    let policy = PolicyConfig::default();
    let store = seed_store(demo_roster())?;
    let attendance = AttendanceService::new(store.clone(), policy);
    let schedule = ScheduleService::new(store, policy);

    let id = |raw: &str| UserId(raw.to_string());
    let admin = attendance.resolve_context(&id("admin"), None)?;
    let district_leader = attendance.resolve_context(&id("dl-north"), None)?;
    let part_leader = attendance.resolve_context(&id("pl-tenor-north"), None)?;
    let tenor = attendance.resolve_context(&id("tenor-a"), None)?;

    println!("Rollcall attendance demo ({})", now.to_rfc3339());

    let event = schedule.create_event(
        &admin,
        EventDraft {
            name: "Spring concert block".to_string(),
            kind: EventKind::Rehearsal,
            scope: DistrictScope::District(DistrictId("north".to_string())),
            pass_mark: 75,
            weekly_constraint: true,
            minimum_minutes_per_week: Some(args.weekly_minimum),
            starts_at: now - Duration::days(14),
            ends_at: now + Duration::days(30),
        },
    )?;
    println!(
        "Event {} '{}' (pass mark {}, weekly minimum {} min)",
        event.id,
        event.name,
        event.pass_mark,
        args.weekly_minimum
    );

    let last_week_start = now - Duration::days(6);
    let today_start = now - Duration::minutes(40);
    let mut sessions = Vec::new();
    for (title, start, minutes) in [
        ("Sectionals", last_week_start, 150),
        ("Full rehearsal", today_start, 120),
    ] {
        let session = schedule.create_session(
            &district_leader,
            SessionDraft {
                event_id: event.id.clone(),
                district_id: None,
                title: Some(title.to_string()),
                start_time: start,
                end_time: start + Duration::minutes(minutes),
            },
        )?;
        println!(
            "  Session {} '{}' {} min, window closes {}",
            session.id,
            title,
            session.window.duration_minutes(),
            (session.window.start() + policy.window_length()).to_rfc3339()
        );
        sessions.push(session);
    }
    let (last_week, today) = (&sessions[0], &sessions[1]);

    println!("\nSelf-service submissions");
    let outcome = attendance.submit(
        &tenor,
        &tenor.effective().id,
        &today.id,
        today.window.start() + Duration::minutes(12),
        now,
    )?;
    println!(
        "  tenor-a arrived {} min late: {} of {} points",
        outcome.breakdown.minutes_late,
        outcome.breakdown.percentage_score,
        outcome.breakdown.max_percentage
    );

    match attendance.submit(
        &tenor,
        &tenor.effective().id,
        &last_week.id,
        last_week.window.start(),
        now,
    ) {
        Ok(_) => println!("  unexpected: last week's window accepted a member submission"),
        Err(err) => println!("  tenor-a on last week's session: {} ({})", err, err.code()),
    }

    println!("\nLeader submissions");
    let outcome = attendance.submit(
        &part_leader,
        &tenor.effective().id,
        &last_week.id,
        last_week.window.start() + Duration::minutes(3),
        now,
    )?;
    println!(
        "  pl-tenor-north recorded last week for tenor-a: {} points",
        outcome.attendance.percentage_score
    );

    match attendance.submit(
        &tenor,
        &tenor.effective().id,
        &today.id,
        today.window.start(),
        now,
    ) {
        Err(AttendanceError::Conflict { edit_allowed, .. }) => println!(
            "  duplicate from tenor-a rejected (edit path available: {edit_allowed})"
        ),
        Err(err) => return Err(err.into()),
        Ok(_) => println!("  unexpected: duplicate submission accepted"),
    }

    match attendance.submit(
        &part_leader,
        &id("bass-a"),
        &today.id,
        today.window.start(),
        now,
    ) {
        Err(err) => println!("  pl-tenor-north for bass-a: {} ({})", err, err.code()),
        Ok(_) => println!("  unexpected: part leader reached another voice part"),
    }

    println!("\nStandings");
    let standing = attendance.event_standing(&tenor, &tenor.effective().id, &event.id)?;
    print_summary(&standing.summary);
    println!(
        "    meets pass mark {}: {}",
        standing.pass_mark, standing.meets_pass_mark
    );

    let exempt = attendance.set_skip(&district_leader, &id("alto-a"), &event.id, true)?;
    print_summary(&exempt);

    Ok(())
}

fn print_summary(summary: &EventAttendanceSummary) {
    println!(
        "  {}: cumulative {} over {} session(s){}",
        summary.user_id,
        summary.cumulative,
        summary.sessions_counted,
        if summary.skip { " [exempt]" } else { "" }
    );
    if let Some(weekly) = summary.weekly {
        println!(
            "    weekly minutes {} / {} -> {}",
            weekly.weekly_minutes,
            weekly.minimum_minutes,
            if weekly.meets_requirement {
                "met"
            } else {
                "short"
            }
        );
    }
}
