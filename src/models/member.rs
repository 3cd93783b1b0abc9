use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteArguments;
use sqlx::query::Query;
use sqlx::{Sqlite, SqliteConnection};
use time::{Date, OffsetDateTime};

use crate::db::Db;
use crate::error::{AdminError, AdminResult};
use crate::models::course_title::CourseKey;
use crate::models::member_course::MemberCourse;
use crate::util::{like_prefix, non_blank, now};
use crate::validation::{validate_max_len, validate_range, validate_required, Validate};

pub const NAME_MAX_LEN: usize = 40;

/// A member of the organization, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Member {
    /// Surrogate key, assigned by the store
    pub member_pk_id: i64,
    /// The member's number, unique and fixed once assigned
    pub member_no: i32,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub details: MemberDetails,
    /// When the record was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_dttm: OffsetDateTime,
    /// When the record was last written
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_dttm: OffsetDateTime,
}

/// Everything about a member that an administrator may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberDetails {
    /// The member's last name
    pub last_name: String,
    /// The member's first name
    pub first_name: String,
    /// The member's middle name
    pub middle_name: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub address: Address,
    /// The congregation the member belongs to
    pub congr_num: Option<i32>,
    /// A second congregation the member is affiliated with
    pub congr_num2: Option<i32>,
    pub ordin_date: Option<Date>,
    pub subscr_date: Option<Date>,
    pub join_date: Option<Date>,
    pub expire_date: Option<Date>,
    pub birth_date: Option<Date>,
    pub area_code: Option<String>,
    pub phone_no: Option<String>,
    pub email_adr: Option<String>,
    /// A short classification, e.g. active or inactive
    pub status: Option<String>,
}

/// Where a member lives. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Address {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Five-digit ZIP code
    pub zip_code: Option<i32>,
    /// Four-digit ZIP+4 extension
    pub zip_ext: Option<i16>,
    /// Free text for addresses that don't fit the domestic fields
    pub foreign_address: Option<String>,
    /// Whether the secondary address mirrors this one, if known
    pub same_adr: Option<bool>,
}

/// A member about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub member_no: i32,
    #[serde(flatten)]
    pub details: MemberDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemberOrder {
    #[default]
    MemberNo,
    /// Last name, then first name, then member number
    Name,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    /// Last names starting with this, ignoring ASCII case
    pub last_name_prefix: Option<String>,
    /// Members belonging to this congregation, primarily or secondarily
    pub congr_num: Option<i32>,
    pub status: Option<String>,
    /// Members enrolled in this course
    pub course: Option<CourseKey>,
    pub order: MemberOrder,
}

impl Address {
    /// Split a legacy two-line address (a street line and a combined
    /// "City, ST" line) into the structured fields.
    ///
    /// The city/state line is split at its last comma; without a comma the
    /// whole line is taken as the city.
    pub fn from_legacy(address: Option<&str>, city_state: Option<&str>) -> Self {
        let (city, state) = match city_state.map(str::trim) {
            Some(line) => match line.rsplit_once(',') {
                Some((city, state)) => (non_blank(Some(city)), non_blank(Some(state))),
                None => (non_blank(Some(line)), None),
            },
            None => (None, None),
        };

        Address {
            address1: non_blank(address),
            city,
            state,
            ..Address::default()
        }
    }

    /// The ZIP code formatted for mailing, e.g. `02139` or `02139-4307`.
    pub fn postal_code(&self) -> Option<String> {
        match (self.zip_code, self.zip_ext) {
            (Some(zip), Some(ext)) => Some(format!("{zip:05}-{ext:04}")),
            (Some(zip), None) => Some(format!("{zip:05}")),
            (None, _) => None,
        }
    }
}

impl Validate for Address {
    fn validate(&self) -> AdminResult<()> {
        validate_max_len("address1", self.address1.as_deref(), 100)?;
        validate_max_len("address2", self.address2.as_deref(), 80)?;
        validate_max_len("city", self.city.as_deref(), 60)?;
        validate_max_len("state", self.state.as_deref(), 10)?;
        validate_range("zip_code", self.zip_code, 0, 99_999)?;
        validate_range("zip_ext", self.zip_ext, 0, 9_999)?;
        validate_max_len("foreign_address", self.foreign_address.as_deref(), 120)
    }
}

impl Validate for MemberDetails {
    fn validate(&self) -> AdminResult<()> {
        validate_required("last_name", &self.last_name, NAME_MAX_LEN)?;
        validate_required("first_name", &self.first_name, NAME_MAX_LEN)?;
        validate_max_len("middle_name", self.middle_name.as_deref(), NAME_MAX_LEN)?;
        self.address.validate()?;
        validate_max_len("area_code", self.area_code.as_deref(), 10)?;
        validate_max_len("phone_no", self.phone_no.as_deref(), 20)?;
        validate_max_len("email_adr", self.email_adr.as_deref(), 120)?;
        validate_max_len("status", self.status.as_deref(), 20)
    }
}

impl Validate for NewMember {
    fn validate(&self) -> AdminResult<()> {
        if self.member_no <= 0 {
            return Err(AdminError::ConstraintViolation(format!(
                "member_no must be a positive number, got {}",
                self.member_no
            )));
        }

        self.details.validate()
    }
}

impl NewMember {
    pub fn new(member_no: i32, first_name: &str, last_name: &str) -> Self {
        NewMember {
            member_no,
            details: MemberDetails {
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
                ..MemberDetails::default()
            },
        }
    }
}

macro_rules! list_members_sql {
    ($order:literal) => {
        concat!(
            "SELECT * FROM membr
             WHERE (?1 IS NULL OR last_name LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR congr_num = ?2 OR congr_num2 = ?2)
               AND (?3 IS NULL OR status = ?3)
               AND (?4 IS NULL OR EXISTS (
                   SELECT 1 FROM member_course mc
                   WHERE mc.member_no = membr.member_no
                     AND mc.ct_type = ?4 AND mc.ct_number = ?5))
             ORDER BY ",
            $order
        )
    };
}

const LIST_MEMBERS_BY_NUMBER: &str = list_members_sql!("member_no");
const LIST_MEMBERS_BY_NAME: &str = list_members_sql!("last_name, first_name, member_no");

const GET_MEMBER: &str = "SELECT * FROM membr WHERE member_no = ?";

impl MemberFilter {
    fn sql(&self) -> &'static str {
        match self.order {
            MemberOrder::MemberNo => LIST_MEMBERS_BY_NUMBER,
            MemberOrder::Name => LIST_MEMBERS_BY_NAME,
        }
    }

    fn query(&self) -> sqlx::query::QueryAs<'static, Sqlite, Member, SqliteArguments<'static>> {
        sqlx::query_as::<_, Member>(self.sql())
            .bind(self.last_name_prefix.as_deref().map(like_prefix))
            .bind(self.congr_num)
            .bind(self.status.clone())
            .bind(self.course.map(|course| String::from(course.ct_type)))
            .bind(self.course.map(|course| course.ct_number))
    }
}

/// Bind every [`MemberDetails`] column in table order.
fn bind_details<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    details: &'q MemberDetails,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let address = &details.address;

    query
        .bind(&details.last_name)
        .bind(&details.first_name)
        .bind(&details.middle_name)
        .bind(&address.address1)
        .bind(&address.address2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(address.zip_code)
        .bind(address.zip_ext)
        .bind(&address.foreign_address)
        .bind(address.same_adr)
        .bind(details.congr_num)
        .bind(details.congr_num2)
        .bind(details.ordin_date)
        .bind(details.subscr_date)
        .bind(details.join_date)
        .bind(details.expire_date)
        .bind(details.birth_date)
        .bind(&details.area_code)
        .bind(&details.phone_no)
        .bind(&details.email_adr)
        .bind(&details.status)
}

impl Member {
    /// The member's full name, with the middle name when there is one
    pub fn full_name(&self) -> String {
        match self.details.middle_name.as_deref().map(str::trim) {
            Some(middle) if !middle.is_empty() => format!(
                "{} {} {}",
                self.details.first_name, middle, self.details.last_name
            ),
            _ => format!("{} {}", self.details.first_name, self.details.last_name),
        }
    }

    pub async fn with_member_no(member_no: i32, db: &Db) -> AdminResult<Self> {
        Self::with_member_no_opt(member_no, db)
            .await?
            .ok_or_else(|| {
                AdminError::not_found(format!("no member with member number {member_no}"))
            })
    }

    pub async fn with_member_no_opt(member_no: i32, db: &Db) -> AdminResult<Option<Self>> {
        tracing::debug!("Loading member {member_no}");

        db.retrying("load member", move || async move {
            sqlx::query_as::<_, Self>(GET_MEMBER)
                .bind(member_no)
                .fetch_optional(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    pub async fn with_id(member_pk_id: i64, db: &Db) -> AdminResult<Self> {
        db.retrying("load member", move || async move {
            sqlx::query_as::<_, Self>("SELECT * FROM membr WHERE member_pk_id = ?")
                .bind(member_pk_id)
                .fetch_optional(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await?
        .ok_or_else(|| AdminError::not_found(format!("no member with id {member_pk_id}")))
    }

    async fn load_opt(member_no: i32, conn: &mut SqliteConnection) -> AdminResult<Option<Self>> {
        sqlx::query_as::<_, Self>(GET_MEMBER)
            .bind(member_no)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AdminError::from)
    }

    async fn load(member_no: i32, conn: &mut SqliteConnection) -> AdminResult<Self> {
        Self::load_opt(member_no, conn).await?.ok_or_else(|| {
            AdminError::not_found(format!("no member with member number {member_no}"))
        })
    }

    pub(crate) async fn exists(member_no: i32, conn: &mut SqliteConnection) -> AdminResult<bool> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM membr WHERE member_no = ?")
            .bind(member_no)
            .fetch_one(&mut *conn)
            .await
            .map(|count| count > 0)
            .map_err(AdminError::from)
    }

    /// All members matching the filter, in the filter's order.
    pub async fn list(filter: &MemberFilter, db: &Db) -> AdminResult<Vec<Self>> {
        db.retrying("list members", move || async move {
            filter
                .query()
                .fetch_all(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    /// Like [`Member::list`], but rows are fetched as the stream is polled.
    /// Each call runs the query afresh.
    pub fn stream(filter: MemberFilter, db: &Db) -> impl Stream<Item = AdminResult<Self>> + '_ {
        filter.query().fetch(db.pool()).map_err(AdminError::from)
    }

    pub async fn count(db: &Db) -> AdminResult<i64> {
        db.retrying("count members", move || async move {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM membr")
                .fetch_one(db.pool())
                .await
                .map_err(AdminError::from)
        })
        .await
    }

    pub async fn create(new_member: NewMember, db: &Db) -> AdminResult<Self> {
        new_member.validate()?;
        let new_member = &new_member;
        let member_no = new_member.member_no;

        let member = db
            .retrying("create member", move || async move {
                let mut tx = db.begin().await?;

                if Self::exists(member_no, &mut tx).await? {
                    return Err(AdminError::ConstraintViolation(format!(
                        "a member with member number {member_no} already exists"
                    )));
                }

                let timestamp = now();
                let insert = sqlx::query(
                    "INSERT INTO membr (
                        member_no, last_name, first_name, middle_name,
                        address1, address2, city, state, zip_code, zip_ext,
                        foreign_address, same_adr, congr_num, congr_num2,
                        ordin_date, subscr_date, join_date, expire_date, birth_date,
                        area_code, phone_no, email_adr, status,
                        created_dttm, last_modified_dttm
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(member_no);
                bind_details(insert, &new_member.details)
                    .bind(timestamp)
                    .bind(timestamp)
                    .execute(&mut *tx)
                    .await?;

                let member = Self::load(member_no, &mut tx).await?;
                tx.commit().await?;

                Ok(member)
            })
            .await?;

        tracing::info!(
            "Created member {} (id {})",
            member.member_no,
            member.member_pk_id
        );
        Ok(member)
    }

    /// Replace a member's details. The member number never changes.
    ///
    /// The last-modified timestamp only ever moves forward, even if the
    /// clock does not.
    pub async fn update(member_no: i32, details: MemberDetails, db: &Db) -> AdminResult<Self> {
        details.validate()?;
        let details = &details;

        let member = db
            .retrying("update member", move || async move {
                let mut tx = db.begin().await?;

                let existing = Self::load(member_no, &mut tx).await?;
                let last_modified = now().max(existing.last_modified_dttm);

                let update = sqlx::query(
                    "UPDATE membr SET
                        last_name = ?, first_name = ?, middle_name = ?,
                        address1 = ?, address2 = ?, city = ?, state = ?, zip_code = ?, zip_ext = ?,
                        foreign_address = ?, same_adr = ?, congr_num = ?, congr_num2 = ?,
                        ordin_date = ?, subscr_date = ?, join_date = ?, expire_date = ?, birth_date = ?,
                        area_code = ?, phone_no = ?, email_adr = ?, status = ?,
                        last_modified_dttm = ?
                    WHERE member_no = ?",
                );
                bind_details(update, details)
                    .bind(last_modified)
                    .bind(member_no)
                    .execute(&mut *tx)
                    .await?;

                let member = Self::load(member_no, &mut tx).await?;
                tx.commit().await?;

                Ok(member)
            })
            .await?;

        tracing::info!("Updated member {member_no}");
        Ok(member)
    }

    /// Remove a member. Refused while the member is enrolled in any course.
    pub async fn delete(member_no: i32, db: &Db) -> AdminResult<()> {
        db.retrying("delete member", move || async move {
            let mut tx = db.begin().await?;

            if !Self::exists(member_no, &mut tx).await? {
                return Err(AdminError::not_found(format!(
                    "no member with member number {member_no}"
                )));
            }

            let enrolled: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM member_course WHERE member_no = ?")
                    .bind(member_no)
                    .fetch_one(&mut *tx)
                    .await?;
            if enrolled > 0 {
                return Err(AdminError::ReferentialIntegrityViolation(format!(
                    "member {member_no} is still enrolled in {enrolled} course(s)"
                )));
            }

            sqlx::query("DELETE FROM membr WHERE member_no = ?")
                .bind(member_no)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(())
        })
        .await?;

        tracing::info!("Deleted member {member_no}");
        Ok(())
    }

    /// The courses this member is enrolled in
    pub async fn courses(&self, db: &Db) -> AdminResult<Vec<MemberCourse>> {
        MemberCourse::for_member(self.member_no, db).await
    }
}
