pub mod course_title;
pub mod member;
pub mod member_course;

pub use course_title::{CourseFilter, CourseKey, CourseTitle, CourseTitleUpdate, CourseType};
pub use member::{Address, Member, MemberDetails, MemberFilter, MemberOrder, NewMember};
pub use member_course::MemberCourse;
