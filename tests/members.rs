mod common;

use aix_admin::models::{Address, CourseTitle, Member, MemberCourse, MemberFilter, MemberOrder};
use aix_admin::AdminError;
use futures::TryStreamExt;
use time::macros::date;

use common::{course_key, mock_course, mock_details, mock_member, test_db};

#[tokio::test]
async fn created_members_read_back_unchanged() {
    let db = test_db().await;

    let mut new_member = mock_member(1001, "Jane", "Doe");
    new_member.details.middle_name = Some("Q".to_owned());
    new_member.details.address = Address {
        address1: Some("12 Elm St".to_owned()),
        city: Some("Macon".to_owned()),
        state: Some("GA".to_owned()),
        zip_code: Some(3120),
        zip_ext: Some(7),
        same_adr: Some(true),
        ..Address::default()
    };
    new_member.details.congr_num = Some(42);
    new_member.details.join_date = Some(date!(2019 - 03 - 01));
    new_member.details.birth_date = Some(date!(1970 - 12 - 31));
    new_member.details.email_adr = Some("jane@example.com".to_owned());
    new_member.details.status = Some("active".to_owned());

    let created = Member::create(new_member.clone(), &db).await.unwrap();
    let loaded = Member::with_member_no(1001, &db).await.unwrap();

    assert_eq!(loaded, created);
    assert_eq!(loaded.member_no, new_member.member_no);
    assert_eq!(loaded.details, new_member.details);
    assert_eq!(loaded.created_dttm, loaded.last_modified_dttm);
    assert_eq!(loaded.details.address.postal_code().as_deref(), Some("03120-0007"));
    assert_eq!(loaded.full_name(), "Jane Q Doe");

    let by_id = Member::with_id(created.member_pk_id, &db).await.unwrap();
    assert_eq!(by_id, created);
}

#[tokio::test]
async fn duplicate_member_numbers_are_rejected() {
    let db = test_db().await;

    Member::create(mock_member(1001, "Jane", "Doe"), &db)
        .await
        .unwrap();
    let error = Member::create(mock_member(1001, "John", "Roe"), &db)
        .await
        .unwrap_err();

    assert!(matches!(error, AdminError::ConstraintViolation(_)));
    assert_eq!(Member::count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_members_never_reach_the_store() {
    let db = test_db().await;

    let mut too_long = mock_member(1001, "Jane", "Doe");
    too_long.details.address.city = Some("x".repeat(61));
    let mut blank = mock_member(1002, "", "Doe");
    blank.details.first_name = "   ".to_owned();

    for new_member in [too_long, blank, mock_member(0, "Jane", "Doe")] {
        let error = Member::create(new_member, &db).await.unwrap_err();
        assert!(matches!(error, AdminError::ConstraintViolation(_)));
    }

    assert_eq!(Member::count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_members_are_not_found() {
    let db = test_db().await;

    assert!(Member::with_member_no_opt(404, &db).await.unwrap().is_none());
    assert!(matches!(
        Member::with_member_no(404, &db).await,
        Err(AdminError::NotFound(_))
    ));
    assert!(matches!(
        Member::update(404, mock_details("Jane", "Doe"), &db).await,
        Err(AdminError::NotFound(_))
    ));
    assert!(matches!(
        Member::delete(404, &db).await,
        Err(AdminError::NotFound(_))
    ));
}

#[tokio::test]
async fn updates_replace_details_and_advance_last_modified() {
    let db = test_db().await;

    let created = Member::create(mock_member(1001, "Jane", "Doe"), &db)
        .await
        .unwrap();

    let mut details = mock_details("Janet", "Doe");
    details.status = Some("inactive".to_owned());
    let first = Member::update(1001, details.clone(), &db).await.unwrap();
    let second = Member::update(1001, details.clone(), &db).await.unwrap();

    assert_eq!(first.member_pk_id, created.member_pk_id);
    assert_eq!(first.details, details);
    assert_eq!(first.created_dttm, created.created_dttm);
    assert!(first.last_modified_dttm >= created.last_modified_dttm);
    assert!(second.last_modified_dttm >= first.last_modified_dttm);
}

#[tokio::test]
async fn invalid_updates_leave_the_member_alone() {
    let db = test_db().await;

    let created = Member::create(mock_member(1001, "Jane", "Doe"), &db)
        .await
        .unwrap();

    let mut details = mock_details("Jane", "Doe");
    details.address.zip_code = Some(100_000);
    let error = Member::update(1001, details, &db).await.unwrap_err();

    assert!(matches!(error, AdminError::ConstraintViolation(_)));
    assert_eq!(Member::with_member_no(1001, &db).await.unwrap(), created);
}

#[tokio::test]
async fn enrolled_members_cannot_be_deleted() {
    let db = test_db().await;
    let key = course_key('B', 1);

    Member::create(mock_member(7, "Ann", "Lee"), &db).await.unwrap();
    CourseTitle::create(mock_course('B', 1, "Basics"), &db)
        .await
        .unwrap();
    MemberCourse::enroll(7, key, None, &db).await.unwrap();

    assert!(matches!(
        Member::delete(7, &db).await,
        Err(AdminError::ReferentialIntegrityViolation(_))
    ));

    MemberCourse::withdraw(7, key, &db).await.unwrap();
    Member::delete(7, &db).await.unwrap();
    assert!(Member::with_member_no_opt(7, &db).await.unwrap().is_none());
}

async fn seed_roster(db: &aix_admin::Db) {
    let mut smith = mock_member(30, "Zed", "Smith");
    smith.details.congr_num = Some(1);
    smith.details.status = Some("active".to_owned());
    let mut adams = mock_member(10, "Amy", "Adams");
    adams.details.congr_num2 = Some(1);
    adams.details.status = Some("inactive".to_owned());
    let mut smithers = mock_member(20, "Al", "smithers");
    smithers.details.congr_num = Some(2);
    smithers.details.status = Some("active".to_owned());
    let mut other_smith = mock_member(40, "Al", "Smith");
    other_smith.details.status = Some("active".to_owned());

    for new_member in [smith, adams, smithers, other_smith] {
        Member::create(new_member, db).await.unwrap();
    }
}

fn member_nos(members: &[Member]) -> Vec<i32> {
    members.iter().map(|member| member.member_no).collect()
}

#[tokio::test]
async fn lists_are_ordered_by_member_number_or_name() {
    let db = test_db().await;
    seed_roster(&db).await;

    let by_number = Member::list(&MemberFilter::default(), &db).await.unwrap();
    assert_eq!(member_nos(&by_number), vec![10, 20, 30, 40]);

    let by_name = MemberFilter {
        order: MemberOrder::Name,
        ..MemberFilter::default()
    };
    let by_name = Member::list(&by_name, &db).await.unwrap();
    assert_eq!(member_nos(&by_name), vec![10, 40, 30, 20]);
}

#[tokio::test]
async fn lists_filter_by_name_congregation_and_status() {
    let db = test_db().await;
    seed_roster(&db).await;

    let smiths = MemberFilter {
        last_name_prefix: Some("SMITH".to_owned()),
        ..MemberFilter::default()
    };
    assert_eq!(
        member_nos(&Member::list(&smiths, &db).await.unwrap()),
        vec![20, 30, 40]
    );

    let congregation = MemberFilter {
        congr_num: Some(1),
        ..MemberFilter::default()
    };
    assert_eq!(
        member_nos(&Member::list(&congregation, &db).await.unwrap()),
        vec![10, 30]
    );

    let active_smiths = MemberFilter {
        last_name_prefix: Some("Smith".to_owned()),
        status: Some("active".to_owned()),
        congr_num: Some(2),
        ..MemberFilter::default()
    };
    assert_eq!(
        member_nos(&Member::list(&active_smiths, &db).await.unwrap()),
        vec![20]
    );

    let wildcard = MemberFilter {
        last_name_prefix: Some("%".to_owned()),
        ..MemberFilter::default()
    };
    assert!(Member::list(&wildcard, &db).await.unwrap().is_empty());
}

#[tokio::test]
async fn lists_filter_by_enrollment() {
    let db = test_db().await;
    seed_roster(&db).await;
    let key = course_key('C', 2);

    CourseTitle::create(mock_course('C', 2, "Choir"), &db)
        .await
        .unwrap();
    MemberCourse::enroll(40, key, None, &db).await.unwrap();
    MemberCourse::enroll(10, key, None, &db).await.unwrap();

    let enrolled = MemberFilter {
        course: Some(key),
        ..MemberFilter::default()
    };
    assert_eq!(
        member_nos(&Member::list(&enrolled, &db).await.unwrap()),
        vec![10, 40]
    );
}

#[tokio::test]
async fn streams_can_be_restarted() {
    let db = test_db().await;
    seed_roster(&db).await;

    let first: Vec<Member> = Member::stream(MemberFilter::default(), &db)
        .try_collect()
        .await
        .unwrap();
    Member::create(mock_member(50, "Bo", "Zane"), &db)
        .await
        .unwrap();
    let second: Vec<Member> = Member::stream(MemberFilter::default(), &db)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(member_nos(&first), vec![10, 20, 30, 40]);
    assert_eq!(member_nos(&second), vec![10, 20, 30, 40, 50]);
}
