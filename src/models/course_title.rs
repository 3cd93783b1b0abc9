use std::fmt;
use std::str::FromStr;

use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::db::Db;
use crate::error::{AdminError, AdminResult};
use crate::models::member_course::MemberCourse;
use crate::validation::{validate_max_len, Validate};

pub const DESCRIPTION_MAX_LEN: usize = 80;

/// The single-character code that, together with a number, names a course.
///
/// Only printable ASCII is accepted, so the code always fits the `CHAR(1)` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseType(char);

impl CourseType {
    pub fn new(code: char) -> AdminResult<Self> {
        if code.is_ascii_graphic() {
            Ok(CourseType(code))
        } else {
            Err(AdminError::ConstraintViolation(format!(
                "ct_type must be a single printable ASCII character, got {code:?}"
            )))
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for CourseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CourseType {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => CourseType::new(code),
            _ => Err(AdminError::ConstraintViolation(format!(
                "ct_type must be exactly one character, got {s:?}"
            ))),
        }
    }
}

impl TryFrom<char> for CourseType {
    type Error = AdminError;

    fn try_from(code: char) -> Result<Self, Self::Error> {
        CourseType::new(code)
    }
}

impl TryFrom<String> for CourseType {
    type Error = AdminError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        code.parse()
    }
}

impl From<CourseType> for String {
    fn from(course_type: CourseType) -> Self {
        course_type.0.to_string()
    }
}

/// The composite key of a course: its type code and number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseKey {
    pub ct_type: CourseType,
    pub ct_number: i16,
}

impl CourseKey {
    pub fn new(ct_type: char, ct_number: i16) -> AdminResult<Self> {
        Ok(CourseKey {
            ct_type: ct_type.try_into()?,
            ct_number,
        })
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ct_type, self.ct_number)
    }
}

/// A catalog entry for a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseTitle {
    /// The course's type code
    #[sqlx(try_from = "String")]
    pub ct_type: CourseType,
    /// The course's number within its type
    pub ct_number: i16,
    /// The primary description
    pub desc1: Option<String>,
    /// The secondary description
    pub desc2: Option<String>,
}

/// The descriptive fields of a course, everything but its key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseTitleUpdate {
    pub desc1: Option<String>,
    pub desc2: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseFilter {
    /// Only courses of this type
    pub ct_type: Option<CourseType>,
}

impl Validate for CourseTitle {
    fn validate(&self) -> AdminResult<()> {
        validate_max_len("desc1", self.desc1.as_deref(), DESCRIPTION_MAX_LEN)?;
        validate_max_len("desc2", self.desc2.as_deref(), DESCRIPTION_MAX_LEN)
    }
}

impl Validate for CourseTitleUpdate {
    fn validate(&self) -> AdminResult<()> {
        validate_max_len("desc1", self.desc1.as_deref(), DESCRIPTION_MAX_LEN)?;
        validate_max_len("desc2", self.desc2.as_deref(), DESCRIPTION_MAX_LEN)
    }
}

const GET_COURSE_TITLE: &str = "SELECT * FROM course_title WHERE ct_type = ? AND ct_number = ?";

const LIST_COURSE_TITLES: &str = "SELECT * FROM course_title
    WHERE (?1 IS NULL OR ct_type = ?1)
    ORDER BY ct_type, ct_number";

impl CourseTitle {
    pub fn key(&self) -> CourseKey {
        CourseKey {
            ct_type: self.ct_type,
            ct_number: self.ct_number,
        }
    }

    pub async fn with_key(key: CourseKey, db: &Db) -> AdminResult<Self> {
        Self::with_key_opt(key, db)
            .await?
            .ok_or_else(|| AdminError::not_found(format!("no course title {key}")))
    }

    pub async fn with_key_opt(key: CourseKey, db: &Db) -> AdminResult<Option<Self>> {
        tracing::debug!("Loading course title {key}");

        db.retrying("load course title", move || async move {
            sqlx::query_as::<_, Self>(GET_COURSE_TITLE)
                .bind(String::from(key.ct_type))
                .bind(key.ct_number)
                .fetch_optional(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    pub(crate) async fn load_opt(
        key: CourseKey,
        conn: &mut SqliteConnection,
    ) -> AdminResult<Option<Self>> {
        sqlx::query_as::<_, Self>(GET_COURSE_TITLE)
            .bind(String::from(key.ct_type))
            .bind(key.ct_number)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AdminError::from)
    }

    /// All course titles matching the filter, ordered by type and then number.
    pub async fn list(filter: &CourseFilter, db: &Db) -> AdminResult<Vec<Self>> {
        db.retrying("list course titles", move || async move {
            sqlx::query_as::<_, Self>(LIST_COURSE_TITLES)
                .bind(filter.ct_type.map(String::from))
                .fetch_all(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    /// Like [`CourseTitle::list`], but rows are fetched as the stream is
    /// polled. Each call runs the query afresh.
    pub fn stream(filter: CourseFilter, db: &Db) -> impl Stream<Item = AdminResult<Self>> + '_ {
        sqlx::query_as::<_, Self>(LIST_COURSE_TITLES)
            .bind(filter.ct_type.map(String::from))
            .fetch(db.pool())
            .map_err(AdminError::from)
    }

    pub async fn count(db: &Db) -> AdminResult<i64> {
        db.retrying("count course titles", move || async move {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_title")
                .fetch_one(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    pub async fn create(course: CourseTitle, db: &Db) -> AdminResult<Self> {
        course.validate()?;
        let course = &course;
        let key = course.key();

        let created = db
            .retrying("create course title", move || async move {
                let mut tx = db.begin().await?;

                if Self::load_opt(key, &mut tx).await?.is_some() {
                    return Err(AdminError::ConstraintViolation(format!(
                        "course title {key} already exists"
                    )));
                }

                sqlx::query(
                    "INSERT INTO course_title (ct_type, ct_number, desc1, desc2)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(String::from(course.ct_type))
                .bind(course.ct_number)
                .bind(&course.desc1)
                .bind(&course.desc2)
                .execute(&mut *tx)
                .await?;

                let created = Self::load_opt(key, &mut tx)
                    .await?
                    .ok_or_else(|| AdminError::not_found(format!("no course title {key}")))?;
                tx.commit().await?;

                Ok(created)
            })
            .await?;

        tracing::info!("Created course title {key}");
        Ok(created)
    }

    pub async fn update(key: CourseKey, update: CourseTitleUpdate, db: &Db) -> AdminResult<Self> {
        update.validate()?;
        let update = &update;

        let updated = db
            .retrying("update course title", move || async move {
                let mut tx = db.begin().await?;

                let affected = sqlx::query(
                    "UPDATE course_title SET desc1 = ?, desc2 = ?
                     WHERE ct_type = ? AND ct_number = ?",
                )
                .bind(&update.desc1)
                .bind(&update.desc2)
                .bind(String::from(key.ct_type))
                .bind(key.ct_number)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if affected == 0 {
                    return Err(AdminError::not_found(format!("no course title {key}")));
                }

                let updated = Self::load_opt(key, &mut tx)
                    .await?
                    .ok_or_else(|| AdminError::not_found(format!("no course title {key}")))?;
                tx.commit().await?;

                Ok(updated)
            })
            .await?;

        tracing::info!("Updated course title {key}");
        Ok(updated)
    }

    /// Remove a course title. Refused while any member is still enrolled in it.
    pub async fn delete(key: CourseKey, db: &Db) -> AdminResult<()> {
        db.retrying("delete course title", move || async move {
            let mut tx = db.begin().await?;

            if Self::load_opt(key, &mut tx).await?.is_none() {
                return Err(AdminError::not_found(format!("no course title {key}")));
            }

            let enrolled: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM member_course WHERE ct_type = ? AND ct_number = ?",
            )
            .bind(String::from(key.ct_type))
            .bind(key.ct_number)
            .fetch_one(&mut *tx)
            .await?;
            if enrolled > 0 {
                return Err(AdminError::ReferentialIntegrityViolation(format!(
                    "course title {key} still has {enrolled} enrollment(s)"
                )));
            }

            sqlx::query("DELETE FROM course_title WHERE ct_type = ? AND ct_number = ?")
                .bind(String::from(key.ct_type))
                .bind(key.ct_number)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(())
        })
        .await?;

        tracing::info!("Deleted course title {key}");
        Ok(())
    }

    /// The members enrolled in this course
    pub async fn enrollments(&self, db: &Db) -> AdminResult<Vec<MemberCourse>> {
        MemberCourse::for_course(self.key(), db).await
    }
}
