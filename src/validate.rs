use std::collections::BTreeMap;

use crate::models::{CourseInput, LessonInput, SignupInput};
use crate::Error;

pub type Violations = BTreeMap<String, String>;

/// One validation rule: a form field, a message, and a predicate that
/// holds for valid input.
pub struct Rule<T> {
    pub field: &'static str,
    pub message: &'static str,
    pub check: fn(&T) -> bool,
}

fn rule<T>(field: &'static str, message: &'static str, check: fn(&T) -> bool) -> Rule<T> {
    Rule {
        field,
        message,
        check,
    }
}

/// Evaluates every rule and collects the full set of violations at once.
/// The first failing message per field wins, so "required" rules must
/// precede the stricter rules for the same field.
pub fn validate<T>(value: &T, rules: &[Rule<T>]) -> Result<(), Error> {
    let mut fields = Violations::new();
    for rule in rules {
        if !(rule.check)(value) {
            fields
                .entry(rule.field.to_string())
                .or_insert_with(|| rule.message.to_string());
        }
    }
    if fields.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { fields })
    }
}

pub fn teacher_rules() -> Vec<Rule<SignupInput>> {
    vec![
        rule("name", "Teacher name is required", |t| {
            !t.name.trim().is_empty()
        }),
        rule("name", "That's too short", |t| {
            t.name.trim().chars().count() >= 3
        }),
        rule("password", "Password is required", |t| {
            !t.password.trim().is_empty()
        }),
        rule("password", "That's too short", |t| {
            t.password.trim().chars().count() >= 3
        }),
        rule("email", "Email is required", |t| !t.email.trim().is_empty()),
        rule("email", "Invalid email address", |t| {
            email_shape_is_valid(&t.email)
        }),
    ]
}

pub fn course_rules() -> Vec<Rule<CourseInput>> {
    vec![
        rule("title", "Title is required", |c| !c.title.trim().is_empty()),
        rule("title", "That's too short", |c| {
            c.title.trim().chars().count() >= 3
        }),
        rule("education", "Education is required", |c| {
            !c.education.trim().is_empty()
        }),
        rule(
            "endDate",
            "End date must be equal to or after the start date",
            |c| c.end_date >= c.start_date,
        ),
        rule("semester", "Semester is required", |c| {
            !c.semester.trim().is_empty()
        }),
        rule("description", "Description is required", |c| {
            !c.description.trim().is_empty()
        }),
    ]
}

pub fn lesson_rules() -> Vec<Rule<LessonInput>> {
    vec![
        rule("title", "Title is required", |l| !l.title.trim().is_empty()),
        rule("time", "Time is required", |l| !l.time.trim().is_empty()),
        rule("content", "Content is required", |l| {
            !l.content.trim().is_empty()
        }),
    ]
}

/// Simple `local@domain.tld` shape check, no whitespace allowed.
pub fn email_shape_is_valid(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((head, tail)) => !head.is_empty() && !tail.is_empty(),
        None => false,
    }
}

/// Canonical form used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
