#![allow(dead_code)]

use aix_admin::models::{CourseKey, CourseTitle, CourseType, MemberDetails, NewMember};
use aix_admin::Db;

pub async fn test_db() -> Db {
    Db::in_memory().await.expect("in-memory store should open")
}

pub fn course_key(ct_type: char, ct_number: i16) -> CourseKey {
    CourseKey::new(ct_type, ct_number).expect("valid course type")
}

pub fn mock_member(member_no: i32, first_name: &str, last_name: &str) -> NewMember {
    NewMember::new(member_no, first_name, last_name)
}

pub fn mock_details(first_name: &str, last_name: &str) -> MemberDetails {
    mock_member(1, first_name, last_name).details
}

pub fn mock_course(ct_type: char, ct_number: i16, desc1: &str) -> CourseTitle {
    CourseTitle {
        ct_type: CourseType::new(ct_type).expect("valid course type"),
        ct_number,
        desc1: Some(desc1.to_owned()),
        desc2: None,
    }
}
