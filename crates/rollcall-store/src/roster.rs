//! People known to the system: id, display name, optional schedule.

use crate::error::ValidationError;
use crate::resilient::Document;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TIME_IN_FORMAT: &str = "%H:%M";

/// Validated person identifier. Also used as the reference photo's file stem,
/// so it is restricted to file-safe characters. Ids read back from disk go
/// through the same check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonId(String);

impl PersonId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ValidationError::Empty("person id"));
        }
        let file_safe = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !file_safe || id.starts_with('.') {
            return Err(ValidationError::InvalidId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PersonId {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<PersonId> for String {
    fn from(id: PersonId) -> Self {
        id.0
    }
}

impl FromStr for PersonId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Expected arrival on a set of weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub days: Vec<Weekday>,
    /// `HH:MM`, kept as written.
    pub time_in: String,
}

impl Schedule {
    /// Validate raw input. `days` accepts names like `mon` or `Monday`.
    pub fn parse<S: AsRef<str>>(days: &[S], time_in: &str) -> Result<Self, ValidationError> {
        let time_in = time_in.trim();
        if time_in.is_empty() {
            return Err(ValidationError::Empty("time-in"));
        }
        if NaiveTime::parse_from_str(time_in, TIME_IN_FORMAT).is_err() {
            return Err(ValidationError::InvalidTime(time_in.to_string()));
        }
        if days.is_empty() {
            return Err(ValidationError::Empty("schedule days"));
        }

        let mut parsed = Vec::with_capacity(days.len());
        for day in days {
            let day = day.as_ref().trim();
            let weekday = Weekday::from_str(day)
                .map_err(|_| ValidationError::InvalidWeekday(day.to_string()))?;
            if !parsed.contains(&weekday) {
                parsed.push(weekday);
            }
        }
        Ok(Self {
            days: parsed,
            time_in: time_in.to_string(),
        })
    }

    /// The expected time, if the stored string parses.
    pub fn expected_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.time_in.trim(), TIME_IN_FORMAT).ok()
    }

    pub fn applies_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty("name"));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    people: Vec<Person>,
}

impl Roster {
    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn get(&self, id: &PersonId) -> Option<&Person> {
        self.people.iter().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.get(id).is_some()
    }

    /// Check that `id` and `name` could be added, without mutating.
    pub fn check_new(&self, id: &PersonId, name: &str) -> Result<String, ValidationError> {
        if self.contains(id) {
            return Err(ValidationError::DuplicateId(id.to_string()));
        }
        validate_name(name)
    }

    pub fn add(&mut self, id: PersonId, name: &str, schedule: Option<Schedule>) -> Result<(), ValidationError> {
        let name = self.check_new(&id, name)?;
        self.people.push(Person { id, name, schedule });
        Ok(())
    }

    /// Returns the previous name.
    pub fn rename(&mut self, id: &PersonId, name: &str) -> Result<String, ValidationError> {
        let name = validate_name(name)?;
        let person = self
            .people
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ValidationError::UnknownId(id.to_string()))?;
        Ok(std::mem::replace(&mut person.name, name))
    }

    pub fn set_schedule(&mut self, id: &PersonId, schedule: Option<Schedule>) -> Result<(), ValidationError> {
        let person = self
            .people
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ValidationError::UnknownId(id.to_string()))?;
        person.schedule = schedule;
        Ok(())
    }

    pub fn remove(&mut self, id: &PersonId) -> Option<Person> {
        let idx = self.people.iter().position(|p| &p.id == id)?;
        Some(self.people.remove(idx))
    }
}

impl Document for Roster {
    const FILE_NAME: &'static str = "roster.json";

    fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}
