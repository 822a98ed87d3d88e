use crate::MemberID;
use crate::error::Result;
use log::warn;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub id: MemberID,
    pub member_no: String,
    pub rank: String,
    pub name: String,
    pub role: Role,
}

impl Member {
    pub fn new<N: Into<String>, R: Into<String>, S: Into<String>>(
        id: MemberID,
        member_no: N,
        rank: R,
        name: S,
    ) -> Self {
        Self {
            id,
            member_no: member_no.into(),
            rank: rank.into(),
            name: name.into(),
            role: Role::Member,
        }
    }

    pub fn operator(mut self) -> Self {
        self.role = Role::Operator;
        self
    }
}

/// Read-only view of registered people. The ledger never writes to it.
pub trait MemberDirectory {
    /// Billable members (role = member), ordered by member number.
    fn members(&self) -> Vec<Member>;

    fn lookup(&self, id: MemberID) -> Option<Member>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    members: BTreeMap<MemberID, Member>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, member: Member) {
        self.members.insert(member.id, member);
    }

    /// Reads `id,member_no,rank,name,role` rows; unreadable rows are skipped.
    pub fn from_csv<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut directory = Self::new();
        for member in reader.deserialize::<Member>() {
            match member {
                Ok(member) => directory.insert(member),
                Err(err) => warn!("Failed to read member row: {err}"),
            }
        }
        Ok(directory)
    }
}

impl FromIterator<Member> for MemoryDirectory {
    fn from_iter<I: IntoIterator<Item = Member>>(iter: I) -> Self {
        let mut directory = Self::new();
        for member in iter {
            directory.insert(member);
        }
        directory
    }
}

impl MemberDirectory for MemoryDirectory {
    fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .values()
            .filter(|member| member.role == Role::Member)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.member_no.cmp(&b.member_no).then(a.id.cmp(&b.id)));
        members
    }

    fn lookup(&self, id: MemberID) -> Option<Member> {
        self.members.get(&id).cloned()
    }
}
