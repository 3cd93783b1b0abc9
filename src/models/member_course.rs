use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use time::Date;

use crate::db::Db;
use crate::error::{AdminError, AdminResult};
use crate::models::course_title::{CourseKey, CourseTitle, CourseType};
use crate::models::member::Member;

/// A member's enrollment in a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberCourse {
    /// The enrolled member's number
    pub member_no: i32,
    /// The course's type code
    #[sqlx(try_from = "String")]
    pub ct_type: CourseType,
    /// The course's number
    pub ct_number: i16,
    /// When the course was assigned to the member
    pub assigned_date: Option<Date>,
}

const GET_MEMBER_COURSE: &str = "SELECT * FROM member_course
    WHERE member_no = ? AND ct_type = ? AND ct_number = ?";

impl MemberCourse {
    pub fn course(&self) -> CourseKey {
        CourseKey {
            ct_type: self.ct_type,
            ct_number: self.ct_number,
        }
    }

    pub async fn with_key_opt(
        member_no: i32,
        course: CourseKey,
        db: &Db,
    ) -> AdminResult<Option<Self>> {
        db.retrying("load enrollment", move || async move {
            sqlx::query_as::<_, Self>(GET_MEMBER_COURSE)
                .bind(member_no)
                .bind(String::from(course.ct_type))
                .bind(course.ct_number)
                .fetch_optional(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    async fn load_opt(
        member_no: i32,
        course: CourseKey,
        conn: &mut SqliteConnection,
    ) -> AdminResult<Option<Self>> {
        sqlx::query_as::<_, Self>(GET_MEMBER_COURSE)
            .bind(member_no)
            .bind(String::from(course.ct_type))
            .bind(course.ct_number)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AdminError::from)
    }

    /// The courses a member is enrolled in, by type and number.
    pub async fn for_member(member_no: i32, db: &Db) -> AdminResult<Vec<Self>> {
        db.retrying("list enrollments for member", move || async move {
            sqlx::query_as::<_, Self>(
                "SELECT * FROM member_course WHERE member_no = ?
                 ORDER BY ct_type, ct_number",
            )
            .bind(member_no)
            .fetch_all(db.pool())
            .await
            .map_err(AdminError::from)
        })
        .await
    }

    /// The enrollments in a course, by member number.
    pub async fn for_course(course: CourseKey, db: &Db) -> AdminResult<Vec<Self>> {
        db.retrying("list enrollments for course", move || async move {
            sqlx::query_as::<_, Self>(
                "SELECT * FROM member_course WHERE ct_type = ? AND ct_number = ?
                 ORDER BY member_no",
            )
            .bind(String::from(course.ct_type))
            .bind(course.ct_number)
            .fetch_all(db.pool())
            .await
            .map_err(AdminError::from)
        })
        .await
    }

    /// Record that a member takes a course.
    ///
    /// Both the member and the course must already exist, and the member must
    /// not already be enrolled.
    pub async fn enroll(
        member_no: i32,
        course: CourseKey,
        assigned_date: Option<Date>,
        db: &Db,
    ) -> AdminResult<Self> {
        let enrollment = db
            .retrying("enroll member", move || async move {
                let mut tx = db.begin().await?;

                if !Member::exists(member_no, &mut tx).await? {
                    return Err(AdminError::not_found(format!(
                        "no member with member number {member_no}"
                    )));
                }
                if CourseTitle::load_opt(course, &mut tx).await?.is_none() {
                    return Err(AdminError::not_found(format!("no course title {course}")));
                }
                if Self::load_opt(member_no, course, &mut tx).await?.is_some() {
                    return Err(AdminError::ConstraintViolation(format!(
                        "member {member_no} is already enrolled in {course}"
                    )));
                }

                sqlx::query(
                    "INSERT INTO member_course (member_no, ct_type, ct_number, assigned_date)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(member_no)
                .bind(String::from(course.ct_type))
                .bind(course.ct_number)
                .bind(assigned_date)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                Ok(MemberCourse {
                    member_no,
                    ct_type: course.ct_type,
                    ct_number: course.ct_number,
                    assigned_date,
                })
            })
            .await?;

        tracing::info!("Enrolled member {member_no} in {course}");
        Ok(enrollment)
    }

    /// Remove a member's enrollment in a course.
    pub async fn withdraw(member_no: i32, course: CourseKey, db: &Db) -> AdminResult<()> {
        db.retrying("withdraw member", move || async move {
            let mut tx = db.begin().await?;

            let affected = sqlx::query(
                "DELETE FROM member_course
                 WHERE member_no = ? AND ct_type = ? AND ct_number = ?",
            )
            .bind(member_no)
            .bind(String::from(course.ct_type))
            .bind(course.ct_number)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if affected == 0 {
                return Err(AdminError::not_found(format!(
                    "member {member_no} is not enrolled in {course}"
                )));
            }
            tx.commit().await?;

            Ok(())
        })
        .await?;

        tracing::info!("Withdrew member {member_no} from {course}");
        Ok(())
    }

    pub async fn set_assigned_date(
        member_no: i32,
        course: CourseKey,
        assigned_date: Option<Date>,
        db: &Db,
    ) -> AdminResult<Self> {
        let updated = db
            .retrying("update enrollment", move || async move {
                let mut tx = db.begin().await?;

                let affected = sqlx::query(
                    "UPDATE member_course SET assigned_date = ?
                     WHERE member_no = ? AND ct_type = ? AND ct_number = ?",
                )
                .bind(assigned_date)
                .bind(member_no)
                .bind(String::from(course.ct_type))
                .bind(course.ct_number)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if affected == 0 {
                    return Err(AdminError::not_found(format!(
                        "member {member_no} is not enrolled in {course}"
                    )));
                }

                let updated = Self::load_opt(member_no, course, &mut tx)
                    .await?
                    .ok_or_else(|| {
                        AdminError::not_found(format!(
                            "member {member_no} is not enrolled in {course}"
                        ))
                    })?;
                tx.commit().await?;

                Ok(updated)
            })
            .await?;

        tracing::info!("Updated assigned date of member {member_no} in {course}");
        Ok(updated)
    }
}
