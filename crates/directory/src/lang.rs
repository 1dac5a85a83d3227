/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Localization lookups for the handful of strings the address book and
//! the store facade render themselves: mailing-list display templates and
//! the well-known IPM folder names.

/// Keys for the four mailing-list display-name templates. `{}` is
/// substituted with the list or container name.
pub const MLIST_TEMPLATE_NORMAL: &str = "mlist0";
pub const MLIST_TEMPLATE_GROUP: &str = "mlist1";
pub const MLIST_TEMPLATE_DOMAIN: &str = "mlist2";
pub const MLIST_TEMPLATE_CLASS: &str = "mlist3";

/// `get_lang(codepage, key)` service: resolve a template for the client
/// codepage, falling back to the built-in English strings.
pub fn get_lang(codepage: u32, key: &str) -> Option<&'static str> {
    // Only the English table ships in-process; other languages come from
    // data files loaded by the front-ends.
    let _ = codepage;
    Some(match key {
        MLIST_TEMPLATE_NORMAL => "custom address list",
        MLIST_TEMPLATE_GROUP => "all users in department of {}",
        MLIST_TEMPLATE_DOMAIN => "all users in domain",
        MLIST_TEMPLATE_CLASS => "all users in group of {}",
        _ => return None,
    })
}

/// The sixteen folders renamed when the mailbox language changes, in
/// rewrite order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderName {
    Ipm,
    Inbox,
    Draft,
    Outbox,
    Sent,
    Deleted,
    Contacts,
    Calendar,
    Journal,
    Notes,
    Tasks,
    Junk,
    SyncIssues,
    Conflicts,
    LocalFailures,
    ServerFailures,
}

pub const FOLDER_NAMES: [FolderName; 16] = [
    FolderName::Ipm,
    FolderName::Inbox,
    FolderName::Draft,
    FolderName::Outbox,
    FolderName::Sent,
    FolderName::Deleted,
    FolderName::Contacts,
    FolderName::Calendar,
    FolderName::Journal,
    FolderName::Notes,
    FolderName::Tasks,
    FolderName::Junk,
    FolderName::SyncIssues,
    FolderName::Conflicts,
    FolderName::LocalFailures,
    FolderName::ServerFailures,
];

/// Localized folder names keyed by the language-tag prefix ("de", "fr",
/// …); unknown locales fall back to English.
pub fn folder_name(locale: &str, folder: FolderName) -> &'static str {
    let prefix = locale
        .split(['_', '-', '.'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match prefix.as_str() {
        "de" => match folder {
            FolderName::Ipm => "Oberste Ebene des Informationsspeichers",
            FolderName::Inbox => "Posteingang",
            FolderName::Draft => "Entwürfe",
            FolderName::Outbox => "Postausgang",
            FolderName::Sent => "Gesendete Elemente",
            FolderName::Deleted => "Gelöschte Elemente",
            FolderName::Contacts => "Kontakte",
            FolderName::Calendar => "Kalender",
            FolderName::Journal => "Journal",
            FolderName::Notes => "Notizen",
            FolderName::Tasks => "Aufgaben",
            FolderName::Junk => "Junk-E-Mail",
            FolderName::SyncIssues => "Synchronisierungsprobleme",
            FolderName::Conflicts => "Konflikte",
            FolderName::LocalFailures => "Lokale Fehler",
            FolderName::ServerFailures => "Serverfehler",
        },
        "fr" => match folder {
            FolderName::Ipm => "Haut de la banque d'informations",
            FolderName::Inbox => "Boîte de réception",
            FolderName::Draft => "Brouillons",
            FolderName::Outbox => "Boîte d'envoi",
            FolderName::Sent => "Éléments envoyés",
            FolderName::Deleted => "Éléments supprimés",
            FolderName::Contacts => "Contacts",
            FolderName::Calendar => "Calendrier",
            FolderName::Journal => "Journal",
            FolderName::Notes => "Notes",
            FolderName::Tasks => "Tâches",
            FolderName::Junk => "Courrier indésirable",
            FolderName::SyncIssues => "Problèmes de synchronisation",
            FolderName::Conflicts => "Conflits",
            FolderName::LocalFailures => "Échecs locaux",
            FolderName::ServerFailures => "Échecs du serveur",
        },
        _ => match folder {
            FolderName::Ipm => "Top of Information Store",
            FolderName::Inbox => "Inbox",
            FolderName::Draft => "Drafts",
            FolderName::Outbox => "Outbox",
            FolderName::Sent => "Sent Items",
            FolderName::Deleted => "Deleted Items",
            FolderName::Contacts => "Contacts",
            FolderName::Calendar => "Calendar",
            FolderName::Journal => "Journal",
            FolderName::Notes => "Notes",
            FolderName::Tasks => "Tasks",
            FolderName::Junk => "Junk E-mail",
            FolderName::SyncIssues => "Sync Issues",
            FolderName::Conflicts => "Conflicts",
            FolderName::LocalFailures => "Local Failures",
            FolderName::ServerFailures => "Server Failures",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_prefix_parsing() {
        assert_eq!(folder_name("de_DE.UTF-8", FolderName::Inbox), "Posteingang");
        assert_eq!(folder_name("fr", FolderName::Sent), "Éléments envoyés");
        assert_eq!(folder_name("pt_BR", FolderName::Inbox), "Inbox");
    }

    #[test]
    fn lang_templates() {
        assert_eq!(get_lang(1252, MLIST_TEMPLATE_DOMAIN), Some("all users in domain"));
        assert_eq!(get_lang(1252, "nonsense"), None);
    }
}
