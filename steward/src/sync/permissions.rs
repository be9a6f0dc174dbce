//! Permission-set builder.
//!
//! Computes the exact overwrite set for a channel from its declared access
//! rule and the full role roster. Every non-everyone role receives exactly
//! one entry (absence from a rule means an explicit deny, never inherited
//! permissions) and the everyone role is computed separately and appended
//! last: a wildcard in a rule never implicitly grants to everyone.

use std::collections::BTreeMap;

use crate::config::AccessRule;
use crate::directory::{Capability, CapabilitySet, Id, PermissionOverwrite, Role};

/// Capabilities granted to students when a channel allows writing, and
/// denied otherwise.
pub const STUDENT_WRITE_CAPABILITIES: [Capability; 4] = [
    Capability::Send,
    Capability::SendInThreads,
    Capability::CreatePublicThreads,
    Capability::CreatePrivateThreads,
];

fn staff_capabilities() -> CapabilitySet {
    let mut set = CapabilitySet::of(&STUDENT_WRITE_CAPABILITIES);
    set.insert(Capability::View);
    set.insert(Capability::Administer);
    set
}

fn matches_rule(list: &[String], role_name: &str) -> bool {
    list.iter().any(|n| n == role_name) || list.iter().any(|n| n == "*")
}

/// Builds the overwrite set for a baseline channel.
///
/// The deny list is evaluated first and is absolute: a denied role gets
/// `deny {View, Send, Speak}` regardless of any wildcard. Otherwise the read
/// list governs View and the write list governs Send, with Speak attached on
/// voice channels only. Anything the allow side grants is removed from the
/// deny side so each entry stays internally consistent.
#[must_use]
pub fn baseline_overwrites(
    roster: &[Role],
    rule: &AccessRule,
    everyone: Id,
    voice: bool,
) -> Vec<PermissionOverwrite> {
    let mut overwrites = Vec::with_capacity(roster.len());

    for role in roster.iter().filter(|r| r.id != everyone) {
        if rule.denies(&role.name) {
            overwrites.push(PermissionOverwrite {
                subject: role.id,
                allow: CapabilitySet::new(),
                deny: CapabilitySet::of(&[
                    Capability::View,
                    Capability::Send,
                    Capability::Speak,
                ]),
            });
            continue;
        }

        let mut allow = CapabilitySet::new();
        let mut deny = CapabilitySet::new();

        if matches_rule(&rule.read, &role.name) {
            allow.insert(Capability::View);
            if voice {
                allow.insert(Capability::Speak);
            }
        } else {
            deny.insert(Capability::View);
            if voice {
                deny.insert(Capability::Speak);
            }
        }

        if matches_rule(&rule.write, &role.name) {
            allow.insert(Capability::Send);
            if voice {
                allow.insert(Capability::Speak);
            }
        } else {
            deny.insert(Capability::Send);
            if voice {
                deny.insert(Capability::Speak);
            }
        }

        deny.subtract(&allow);
        overwrites.push(PermissionOverwrite {
            subject: role.id,
            allow,
            deny,
        });
    }

    overwrites.push(everyone_overwrite(rule, everyone, voice));
    overwrites
}

/// The final overwrite entry for the everyone role, driven solely by whether
/// the wildcard appears in the read/write lists.
fn everyone_overwrite(rule: &AccessRule, everyone: Id, voice: bool) -> PermissionOverwrite {
    let mut allow = CapabilitySet::new();
    let mut deny = CapabilitySet::new();

    if rule.read.iter().any(|n| n == "*") {
        allow.insert(Capability::View);
        if voice {
            allow.insert(Capability::Speak);
        }
    } else {
        deny.insert(Capability::View);
        if voice {
            deny.insert(Capability::Speak);
        }
    }

    if rule.write.iter().any(|n| n == "*") {
        allow.insert(Capability::Send);
        if voice {
            allow.insert(Capability::Speak);
        }
    } else {
        deny.insert(Capability::Send);
        if voice {
            deny.insert(Capability::Speak);
        }
    }

    deny.subtract(&allow);
    PermissionOverwrite {
        subject: everyone,
        allow,
        deny,
    }
}

/// Overwrites for a cohort channel: hidden from everyone, visible to the
/// cohort role (writable when `student_write`), full access for staff.
#[must_use]
pub fn cohort_channel_overwrites(
    everyone: Id,
    cohort_role: Id,
    student_write: bool,
    staff: &[Id],
) -> Vec<PermissionOverwrite> {
    let mut overwrites = vec![PermissionOverwrite {
        subject: everyone,
        allow: CapabilitySet::new(),
        deny: CapabilitySet::of(&[Capability::View]),
    }];

    let write_set = CapabilitySet::of(&STUDENT_WRITE_CAPABILITIES);
    overwrites.push(if student_write {
        PermissionOverwrite {
            subject: cohort_role,
            allow: write_set.with(Capability::View),
            deny: CapabilitySet::new(),
        }
    } else {
        PermissionOverwrite {
            subject: cohort_role,
            allow: CapabilitySet::of(&[Capability::View]),
            deny: write_set,
        }
    });

    for &role in staff {
        overwrites.push(PermissionOverwrite {
            subject: role,
            allow: staff_capabilities(),
            deny: CapabilitySet::new(),
        });
    }

    overwrites
}

/// Overwrites for a cohort category: cohort role sees it, everyone does not.
#[must_use]
pub fn cohort_category_overwrites(everyone: Id, cohort_role: Id) -> Vec<PermissionOverwrite> {
    vec![
        PermissionOverwrite {
            subject: cohort_role,
            allow: CapabilitySet::of(&[Capability::View]),
            deny: CapabilitySet::new(),
        },
        PermissionOverwrite {
            subject: everyone,
            allow: CapabilitySet::new(),
            deny: CapabilitySet::of(&[Capability::View]),
        },
    ]
}

/// Overwrites applied to archived channels and to the Archive category
/// itself: invisible to everyone, readable and writable by the maintainer.
#[must_use]
pub fn archive_overwrites(everyone: Id, maintainer: Option<Id>) -> Vec<PermissionOverwrite> {
    let mut overwrites = Vec::new();
    if let Some(maintainer) = maintainer {
        overwrites.push(PermissionOverwrite {
            subject: maintainer,
            allow: CapabilitySet::of(&[Capability::View, Capability::Send]),
            deny: CapabilitySet::new(),
        });
    }
    overwrites.push(PermissionOverwrite {
        subject: everyone,
        allow: CapabilitySet::new(),
        deny: CapabilitySet::of(&[Capability::View, Capability::Send]),
    });
    overwrites
}

/// Structural equality of overwrite sets, ignoring entry order and entries
/// that grant nothing. Used for diff-before-write.
#[must_use]
pub fn overwrites_equal(current: &[PermissionOverwrite], desired: &[PermissionOverwrite]) -> bool {
    fn as_map(
        overwrites: &[PermissionOverwrite],
    ) -> BTreeMap<Id, (&CapabilitySet, &CapabilitySet)> {
        overwrites
            .iter()
            .filter(|o| !(o.allow.is_empty() && o.deny.is_empty()))
            .map(|o| (o.subject, (&o.allow, &o.deny)))
            .collect()
    }
    as_map(current) == as_map(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Role;

    const EVERYONE: Id = 1;

    fn role(id: Id, name: &str) -> Role {
        Role {
            id,
            name: name.to_string(),
            color: 0,
            capabilities: CapabilitySet::new(),
            hoist: false,
            position: 0,
        }
    }

    fn roster() -> Vec<Role> {
        vec![
            role(EVERYONE, "@everyone"),
            role(2, "RoleX"),
            role(3, "Faculty"),
            role(4, "Student"),
        ]
    }

    fn entry(overwrites: &[PermissionOverwrite], subject: Id) -> &PermissionOverwrite {
        overwrites.iter().find(|o| o.subject == subject).unwrap()
    }

    #[test]
    fn deny_list_wins_over_wildcard_read() {
        let rule = AccessRule {
            read: vec!["*".to_string()],
            write: vec![],
            deny: Some(vec!["RoleX".to_string()]),
        };
        let overwrites = baseline_overwrites(&roster(), &rule, EVERYONE, false);

        let denied = entry(&overwrites, 2);
        assert!(denied.allow.is_empty());
        assert_eq!(
            denied.deny,
            CapabilitySet::of(&[Capability::View, Capability::Send, Capability::Speak])
        );

        for subject in [3, 4] {
            let other = entry(&overwrites, subject);
            assert_eq!(other.allow, CapabilitySet::of(&[Capability::View]));
            assert_eq!(other.deny, CapabilitySet::of(&[Capability::Send]));
        }
    }

    #[test]
    fn one_entry_per_role_plus_everyone() {
        let rule = AccessRule {
            read: vec!["Faculty".to_string()],
            write: vec!["Faculty".to_string()],
            deny: None,
        };
        let overwrites = baseline_overwrites(&roster(), &rule, EVERYONE, false);
        // 3 non-everyone roles + everyone, each exactly once.
        assert_eq!(overwrites.len(), 4);
        assert_eq!(overwrites.last().unwrap().subject, EVERYONE);
    }

    #[test]
    fn wildcard_never_grants_to_everyone_in_role_loop() {
        let rule = AccessRule {
            read: vec!["*".to_string()],
            write: vec!["*".to_string()],
            deny: None,
        };
        let overwrites = baseline_overwrites(&roster(), &rule, EVERYONE, false);
        let everyone_entries: Vec<_> =
            overwrites.iter().filter(|o| o.subject == EVERYONE).collect();
        assert_eq!(everyone_entries.len(), 1);
        // Wildcard in both lists does allow-list everyone explicitly here.
        assert_eq!(
            everyone_entries[0].allow,
            CapabilitySet::of(&[Capability::View, Capability::Send])
        );
    }

    #[test]
    fn everyone_denied_without_wildcard() {
        let rule = AccessRule {
            read: vec!["Faculty".to_string()],
            write: vec![],
            deny: None,
        };
        let overwrites = baseline_overwrites(&roster(), &rule, EVERYONE, false);
        let everyone = entry(&overwrites, EVERYONE);
        assert!(everyone.allow.is_empty());
        assert_eq!(
            everyone.deny,
            CapabilitySet::of(&[Capability::View, Capability::Send])
        );
    }

    #[test]
    fn voice_channels_carry_speak() {
        let rule = AccessRule {
            read: vec!["Faculty".to_string()],
            write: vec!["Faculty".to_string()],
            deny: None,
        };
        let overwrites = baseline_overwrites(&roster(), &rule, EVERYONE, true);
        let faculty = entry(&overwrites, 3);
        assert!(faculty.allow.contains(Capability::Speak));
        let student = entry(&overwrites, 4);
        assert!(student.deny.contains(Capability::Speak));
    }

    #[test]
    fn allow_trumps_deny_within_one_entry() {
        // Read grants View+Speak on voice, write denies Send+Speak; Speak
        // must not end up on both sides.
        let rule = AccessRule {
            read: vec!["Student".to_string()],
            write: vec![],
            deny: None,
        };
        let overwrites = baseline_overwrites(&roster(), &rule, EVERYONE, true);
        let student = entry(&overwrites, 4);
        assert!(student.allow.contains(Capability::Speak));
        assert!(!student.deny.contains(Capability::Speak));
    }

    #[test]
    fn cohort_channel_read_only_for_students() {
        let overwrites = cohort_channel_overwrites(EVERYONE, 7, false, &[3]);
        let cohort = entry(&overwrites, 7);
        assert_eq!(cohort.allow, CapabilitySet::of(&[Capability::View]));
        assert_eq!(cohort.deny, CapabilitySet::of(&STUDENT_WRITE_CAPABILITIES));

        let staff = entry(&overwrites, 3);
        assert!(staff.allow.contains(Capability::Administer));

        let everyone = entry(&overwrites, EVERYONE);
        assert_eq!(everyone.deny, CapabilitySet::of(&[Capability::View]));
    }

    #[test]
    fn overwrite_comparison_ignores_order_and_empty_entries() {
        let a = vec![
            PermissionOverwrite {
                subject: 2,
                allow: CapabilitySet::of(&[Capability::View]),
                deny: CapabilitySet::new(),
            },
            PermissionOverwrite {
                subject: 3,
                allow: CapabilitySet::new(),
                deny: CapabilitySet::new(),
            },
        ];
        let b = vec![PermissionOverwrite {
            subject: 2,
            allow: CapabilitySet::of(&[Capability::View]),
            deny: CapabilitySet::new(),
        }];
        assert!(overwrites_equal(&a, &b));
        assert!(!overwrites_equal(&a, &[]));
    }
}
