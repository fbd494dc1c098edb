use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use lms_core::model::{CategoryId, ChapterId, CourseId, PaymentStatus, UserId};
use rust_decimal::Decimal;

/// Operator CLI for the course platform database.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// SQLite database URL or file path
    #[arg(long = "db", env = "LMS_DB_URL", default_value = "sqlite://lms.sqlite3", global = true)]
    pub db_url: String,

    /// Acting user id; commands that read or write on someone's behalf need it
    #[arg(long = "user", env = "LMS_USER_ID", global = true)]
    pub user: Option<UserId>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or upgrade the schema
    Migrate,
    /// Insert demo users, permissions and courses
    Seed,
    /// Show the acting student's enrolled courses with fresh progress
    Dashboard,
    /// Enroll the acting student in a course
    Enroll { course: CourseId },
    /// Mark a chapter complete for the acting student
    Complete { chapter: ChapterId },
    /// Recompute and show the acting student's progress in a course
    Progress { course: CourseId },
    /// Payment history with per-status totals
    Payments(PaymentsArgs),
    /// Manage courses
    #[command(subcommand)]
    Course(CourseCommand),
}

#[derive(Debug, Args)]
pub struct PaymentsArgs {
    #[arg(long)]
    pub status: Option<PaymentStatus>,
    #[arg(long)]
    pub course: Option<CourseId>,
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum CourseCommand {
    /// Create a draft course owned by the acting user
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "0.00")]
        price: Decimal,
        #[arg(long)]
        category: Option<CategoryId>,
    },
    Publish { course: CourseId },
    Archive { course: CourseId },
    /// Bring an archived course back as a draft
    Restore { course: CourseId },
    /// Courses owned by the acting user
    List,
    /// Course outline, with the acting user's progress when enrolled
    Show { course: CourseId },
}

/// Turn a bare path (or `sqlite:path`) into an absolute `sqlite://` URL that
/// creates the file on first use.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }
    if trimmed.starts_with("sqlite:file:") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

/// Make sure the parent directory of a file-backed URL exists.
pub fn prepare_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let Some(rest) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_pass_through() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite://lms.sqlite3"),
            "sqlite://lms.sqlite3"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:file:x?mode=memory&cache=shared"),
            "sqlite:file:x?mode=memory&cache=shared"
        );
    }

    #[test]
    fn bare_paths_become_absolute_rwc_urls() {
        let url = normalize_sqlite_url("/tmp/lms/dev.sqlite3");
        assert_eq!(url, "sqlite:///tmp/lms/dev.sqlite3?mode=rwc");

        let relative = normalize_sqlite_url("sqlite:dev.sqlite3");
        assert!(relative.starts_with("sqlite:///"));
        assert!(relative.ends_with("dev.sqlite3?mode=rwc"));
    }

    #[test]
    fn cli_reads_subcommands_and_ids() {
        let cli = Cli::try_parse_from(["lms", "--user", "2", "enroll", "7"]).unwrap();
        assert_eq!(cli.user, Some(UserId::new(2)));
        assert!(matches!(cli.command, Command::Enroll { course } if course == CourseId::new(7)));

        let cli = Cli::try_parse_from([
            "lms", "course", "create", "--title", "Iterators", "--price", "19.90",
        ])
        .unwrap();
        match cli.command {
            Command::Course(CourseCommand::Create { title, price, .. }) => {
                assert_eq!(title, "Iterators");
                assert_eq!(price.to_string(), "19.90");
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["lms", "payments", "--status", "refunded"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Payments(PaymentsArgs {
                status: Some(PaymentStatus::Refunded),
                ..
            })
        ));
    }
}
