use lms_core::model::permission::{
    AUDIT_VIEW_LOGS, COURSE_MANAGE_ALL, COURSE_MANAGE_OWN, PAYMENT_REFUND, PAYMENT_VIEW_HISTORY,
    SECURITY_VIEW_WARNINGS, USER_MANAGE,
};
use lms_core::model::{ContentType, Course, CourseId, Role, User, UserId};
use lms_core::time::Clock;
use rust_decimal::Decimal;
use storage::repository::{NewChapterRecord, NewCourseRecord, NewSectionRecord, Storage};

const TEACHER: UserId = UserId::new(1);

/// (title, price in cents, publish?, sections of (title, chapters))
type DemoCourse = (
    &'static str,
    i64,
    bool,
    &'static [(&'static str, &'static [(&'static str, ContentType)])],
);

const DEMO_COURSES: &[DemoCourse] = &[
    (
        "Rust from zero",
        0,
        true,
        &[
            (
                "Getting started",
                &[
                    ("Installing the toolchain", ContentType::Video),
                    ("Hello, cargo", ContentType::Text),
                ],
            ),
            (
                "Ownership",
                &[
                    ("Moves and copies", ContentType::Video),
                    ("Borrowing rules", ContentType::Text),
                    ("Lifetimes in practice", ContentType::Text),
                ],
            ),
        ],
    ),
    (
        "Async Rust in production",
        4990,
        true,
        &[(
            "Runtimes",
            &[
                ("Futures and polling", ContentType::Video),
                ("Choosing a runtime", ContentType::Text),
            ],
        )],
    ),
    ("Unsafe Rust (work in progress)", 0, false, &[]),
];

/// Demo users, role defaults and courses. Safe to run twice: users and grants
/// are upserts and courses are only created for a teacher who has none.
pub async fn run(storage: &Storage) -> anyhow::Result<()> {
    let users = [
        User::new(TEACHER, Role::Teacher, "Tess Teacher", "tess@example.com")?,
        User::new(UserId::new(2), Role::Student, "Stu Student", "stu@example.com")?,
        User::new(UserId::new(3), Role::Admin, "Ada Admin", "ada@example.com")?,
    ];
    for user in &users {
        storage.users.upsert_user(user).await?;
    }

    storage
        .permissions
        .grant_role(Role::Teacher, COURSE_MANAGE_OWN)
        .await?;
    for name in [
        COURSE_MANAGE_ALL,
        PAYMENT_VIEW_HISTORY,
        PAYMENT_REFUND,
        SECURITY_VIEW_WARNINGS,
        AUDIT_VIEW_LOGS,
        USER_MANAGE,
    ] {
        storage.permissions.grant_role(Role::Admin, name).await?;
    }

    if !storage.courses.courses_by_teacher(TEACHER).await?.is_empty() {
        tracing::info!("demo courses already present");
        return Ok(());
    }

    let now = Clock::default().now();
    for &(title, cents, publish, sections) in DEMO_COURSES {
        let mut course = Course::new_draft(
            CourseId::new(0),
            TEACHER,
            None,
            title,
            Decimal::new(cents, 2),
            now,
        )
        .map_err(lms_core::Error::from)?;
        if publish {
            course.publish().map_err(lms_core::Error::from)?;
        }
        let course_id = storage
            .courses
            .insert_course(NewCourseRecord::from_course(&course))
            .await?;

        for (s, &(section_title, chapters)) in sections.iter().enumerate() {
            let section_id = storage
                .courses
                .insert_section(NewSectionRecord {
                    course_id,
                    title: section_title.to_owned(),
                    order_index: u32::try_from(s)?,
                })
                .await?;
            for (c, &(chapter_title, content_type)) in chapters.iter().enumerate() {
                storage
                    .courses
                    .insert_chapter(NewChapterRecord {
                        section_id,
                        title: chapter_title.to_owned(),
                        content_type,
                        order_index: u32::try_from(c)?,
                    })
                    .await?;
            }
        }
        tracing::info!(course_id = course_id.value(), title, "seeded course");
    }
    Ok(())
}
