use anyhow::{Context, bail};
use lms_core::model::{Course, PaymentStatus, RequestContext};
use services::{
    Access, AppServices, CardProgress, Clock, CourseDetail, CourseDraft, DashboardCard,
    EnrollOutcome, PaymentReport,
};
use storage::repository::PaymentFilter;

use crate::cli::{Cli, Command, CourseCommand, PaymentsArgs};
use crate::seed;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = AppServices::new_sqlite(&cli.db_url, Clock::default())
        .await
        .with_context(|| format!("cannot open {}", cli.db_url))?;

    match cli.command {
        Command::Migrate => {
            tracing::info!(db = %cli.db_url, "schema is up to date");
        }
        Command::Seed => seed::run(app.storage()).await?,
        Command::Dashboard => {
            let ctx = acting_user(&app, &cli).await?;
            let cards = app.dashboard().cards(&ctx).await;
            print_dashboard(&cards, cli.json)?;
        }
        Command::Enroll { course } => {
            let ctx = acting_user(&app, &cli).await?;
            match app.enrollment().enroll(&ctx, course).await? {
                EnrollOutcome::Enrolled { course_id } => {
                    println!("enrolled in course {course_id}");
                }
                EnrollOutcome::CheckoutRequired { course_id, price } => {
                    println!("course {course_id} costs {price}; checkout required");
                }
            }
        }
        Command::Complete { chapter } => {
            let ctx = acting_user(&app, &cli).await?;
            let snap = app.progress().complete_chapter(&ctx, chapter).await?;
            println!(
                "{}/{} chapters, {}% ({})",
                snap.completed_chapters, snap.total_chapters, snap.percentage, snap.status
            );
        }
        Command::Progress { course } => {
            let ctx = acting_user(&app, &cli).await?;
            let snap = app.progress().for_student(&ctx, course).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snap)?);
            } else {
                println!(
                    "{}/{} chapters, {}% ({})",
                    snap.completed_chapters, snap.total_chapters, snap.percentage, snap.status
                );
            }
        }
        Command::Payments(ref args) => {
            let ctx = acting_user(&app, &cli).await?;
            let filter = payment_filter(args);
            match app.payment_reports().history(&ctx, &filter).await? {
                Access::Granted(report) => print_payments(&report, cli.json)?,
                Access::Restricted => bail!("user {} may not view payment history", ctx.user_id()),
            }
        }
        Command::Course(ref command) => {
            let ctx = acting_user(&app, &cli).await?;
            run_course(&app, &ctx, command, cli.json).await?;
        }
    }
    Ok(())
}

async fn run_course(
    app: &AppServices,
    ctx: &RequestContext,
    command: &CourseCommand,
    json: bool,
) -> anyhow::Result<()> {
    let courses = app.courses();
    match command {
        CourseCommand::Create {
            title,
            price,
            category,
        } => {
            let id = courses
                .create_draft(
                    ctx,
                    CourseDraft {
                        title: title.clone(),
                        price: *price,
                        category_id: *category,
                    },
                )
                .await?;
            println!("created draft course {id}");
        }
        CourseCommand::Publish { course } => {
            print_course(&courses.publish(ctx, *course).await?);
        }
        CourseCommand::Archive { course } => {
            print_course(&courses.archive(ctx, *course).await?);
        }
        CourseCommand::Restore { course } => {
            print_course(&courses.restore(ctx, *course).await?);
        }
        CourseCommand::Show { course } => {
            let Some(detail) = app.dashboard().course_detail(ctx, *course).await else {
                bail!("course {course} not found");
            };
            print_course_detail(&detail, json)?;
        }
        CourseCommand::List => {
            let own = courses.list_own(ctx).await?;
            if json {
                let rows: Vec<serde_json::Value> = own
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id(),
                            "title": c.title(),
                            "price": c.price(),
                            "status": c.status(),
                            "created_at": c.created_at(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for course in &own {
                    print_course(course);
                }
            }
        }
    }
    Ok(())
}

async fn acting_user(app: &AppServices, cli: &Cli) -> anyhow::Result<RequestContext> {
    let Some(user_id) = cli.user else {
        bail!("this command needs --user (or LMS_USER_ID)");
    };
    Ok(app.request_context(user_id).await?)
}

fn payment_filter(args: &PaymentsArgs) -> PaymentFilter {
    PaymentFilter {
        status: args.status,
        user_id: None,
        course_id: args.course,
        limit: args.limit,
    }
}

fn print_course(course: &Course) {
    println!(
        "{:>5}  {:<10} {:>8}  {}",
        course.id().value(),
        course.status().as_str(),
        course.price().to_string(),
        course.title()
    );
}

fn print_course_detail(detail: &CourseDetail, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(detail)?);
        return Ok(());
    }
    println!(
        "{} [{}] {}",
        detail.title,
        detail.status.as_str(),
        detail.price
    );
    for outline in &detail.sections {
        println!("  {}", outline.section.title);
        for chapter in &outline.chapters {
            println!(
                "    {:>5}  {:<5} {}",
                chapter.id.value(),
                chapter.content_type.as_str(),
                chapter.title
            );
        }
    }
    if let Some(snap) = &detail.progress {
        println!(
            "progress: {}/{} chapters, {}% ({})",
            snap.completed_chapters, snap.total_chapters, snap.percentage, snap.status
        );
    }
    Ok(())
}

fn print_dashboard(cards: &[DashboardCard], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(cards)?);
        return Ok(());
    }
    if cards.is_empty() {
        println!("no enrolled courses");
    }
    for card in cards {
        let percentage = card
            .progress
            .percentage()
            .map_or_else(|| "-".to_owned(), |p| p.to_string());
        let status = card.progress.status().map_or("unknown", |s| s.as_str());
        let stale = if matches!(card.progress, CardProgress::Cached(_)) {
            " (cached)"
        } else {
            ""
        };
        println!(
            "{:>5}  {:>6}%  {:<12} {}{stale}",
            card.course_id.value(),
            percentage,
            status,
            card.title
        );
    }
    Ok(())
}

fn print_payments(report: &PaymentReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for p in &report.payments {
        println!(
            "{:>5}  {}  user {:<5} course {:<5} {:>8}  {:<9} {}",
            p.id.value(),
            p.payment_date.format("%Y-%m-%d %H:%M"),
            p.user_id.value(),
            p.course_id.value(),
            p.amount.to_string(),
            p.status.as_str(),
            p.payment_type.as_str()
        );
    }
    println!();
    for status in PaymentStatus::ALL {
        let total = report.totals.get(status);
        println!(
            "{:<9} {:>4} rows  {:>10}",
            status.as_str(),
            total.count,
            total.amount.to_string()
        );
    }
    println!("net revenue {}", report.totals.net_revenue());
    Ok(())
}
