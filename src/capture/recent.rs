//! Registers saved screenshots in the desktop's recently-used index
//! (`$XDG_DATA_HOME/recently-used.xbel`).

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use log::{debug, warn};

const APP_NAME: &str = "waysnap";
const APP_EXEC: &str = "gio open %u";

const XBEL_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbel version="1.0"
      xmlns:bookmark="http://www.freedesktop.org/standards/desktop-bookmarks"
      xmlns:mime="http://www.freedesktop.org/standards/shared-mime-info"
>
"#;
const XBEL_CLOSE: &str = "</xbel>";

/// Default location of the index.
pub fn recent_files_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("recently-used.xbel"))
}

/// Adds `uri` to the index at `index`, creating the index if needed.
///
/// An entry that is already present gets its timestamps refreshed and our
/// application's use count bumped.
pub fn add_recent_file(index: &Path, uri: &str, now: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = index.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let lock_path = index.with_extension("xbel.lock");
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| format!("failed to lock {}", lock_path.display()))?;

    let result = add_locked(index, uri, now);

    lock_file.unlock().unwrap_or_else(|err| {
        warn!("failed to unlock {}: {}", lock_path.display(), err)
    });

    result
}

fn add_locked(index: &Path, uri: &str, now: DateTime<Utc>) -> Result<()> {
    let existing = match fs::read_to_string(index) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open bookmarks {}", index.display()));
        }
    };

    let href = format!("href=\"{}\"", escape(uri));
    let updated = match existing {
        Some(text) if text.contains(&href) => {
            debug!("Refreshing {} in {}", uri, index.display());
            match refresh_entry(&text, &href, now) {
                Some(doc) => doc,
                None => bail!("{} has a malformed entry for {}", index.display(), uri),
            }
        }
        Some(text) => {
            let Some(close) = text.rfind(XBEL_CLOSE) else {
                bail!("{} is not an xbel document", index.display());
            };
            let mut doc = String::with_capacity(text.len() + 512);
            doc.push_str(&text[..close]);
            doc.push_str(&bookmark_entry(uri, now));
            doc.push_str(&text[close..]);
            doc
        }
        None => format!("{}{}{}\n", XBEL_HEADER, bookmark_entry(uri, now), XBEL_CLOSE),
    };

    let tmp_path = index.with_extension("xbel.tmp");
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open {}", tmp_path.display()))?;
        tmp.write_all(updated.as_bytes())
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tmp.sync_all().ok();
    }
    fs::rename(&tmp_path, index)
        .with_context(|| format!("failed to save bookmarks {}", index.display()))?;
    Ok(())
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn application_entry(stamp: &str) -> String {
    format!(
        "<bookmark:application name=\"{}\" exec=\"&apos;{}&apos;\" modified=\"{}\" count=\"1\"/>",
        APP_NAME, APP_EXEC, stamp
    )
}

fn bookmark_entry(uri: &str, now: DateTime<Utc>) -> String {
    let stamp = timestamp(now);
    format!(
        concat!(
            "  <bookmark href=\"{href}\" added=\"{ts}\" modified=\"{ts}\" visited=\"{ts}\">\n",
            "    <info>\n",
            "      <metadata owner=\"http://freedesktop.org\">\n",
            "        <mime:mime-type type=\"image/png\"/>\n",
            "        <bookmark:applications>\n",
            "          {app}\n",
            "        </bookmark:applications>\n",
            "      </metadata>\n",
            "    </info>\n",
            "  </bookmark>\n",
        ),
        href = escape(uri),
        ts = stamp,
        app = application_entry(&stamp),
    )
}

/// Rewrites the bookmark holding `href`: `modified`/`visited` move to `now`,
/// our application entry gets a new `modified` and a bumped `count`.
fn refresh_entry(text: &str, href: &str, now: DateTime<Utc>) -> Option<String> {
    let stamp = timestamp(now);
    let href_at = text.find(href)?;
    let start = text[..href_at].rfind("<bookmark ")?;
    let end = href_at + text[href_at..].find("</bookmark>")?;
    let entry = &text[start..end];

    let open_end = entry.find('>')? + 1;
    let opening = set_attr(&entry[..open_end], "modified", &stamp);
    let opening = set_attr(&opening, "visited", &stamp);

    let body = &entry[open_end..];
    let marker = format!("<bookmark:application name=\"{}\"", APP_NAME);
    let body = match body.find(&marker) {
        Some(at) => {
            let tag_end = at + body[at..].find('>')? + 1;
            let tag = &body[at..tag_end];
            let count = attr(tag, "count")
                .and_then(|count| count.parse::<u32>().ok())
                .unwrap_or(0);
            let tag = set_attr(tag, "modified", &stamp);
            let tag = set_attr(&tag, "count", &count.saturating_add(1).to_string());
            format!("{}{}{}", &body[..at], tag, &body[tag_end..])
        }
        None => match body.find("</bookmark:applications>") {
            Some(at) => format!(
                "{}  {}\n        {}",
                &body[..at],
                application_entry(&stamp),
                &body[at..]
            ),
            None => body.to_string(),
        },
    };

    Some(format!("{}{}{}{}", &text[..start], opening, body, &text[end..]))
}

fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let key = format!(" {}=\"", name);
    let value_start = tag.find(&key)? + key.len();
    let len = tag[value_start..].find('"')?;
    Some(&tag[value_start..value_start + len])
}

/// Sets attribute `name` on a single start tag, adding it if missing.
fn set_attr(tag: &str, name: &str, value: &str) -> String {
    let key = format!(" {}=\"", name);
    if let Some(at) = tag.find(&key) {
        let value_start = at + key.len();
        if let Some(len) = tag[value_start..].find('"') {
            return format!("{}{}{}", &tag[..value_start], value, &tag[value_start + len..]);
        }
    }
    let close = if tag.ends_with("/>") {
        tag.len() - 2
    } else {
        tag.len().saturating_sub(1)
    };
    format!("{} {}=\"{}\"{}", &tag[..close], name, value, &tag[close..])
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 21, 10, 0, 0).unwrap()
    }

    #[test]
    fn creates_index_with_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("share").join("recently-used.xbel");
        add_recent_file(&index, "file:///home/me/Pictures/a.png", now()).unwrap();

        let text = fs::read_to_string(&index).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.trim_end().ends_with("</xbel>"));
        assert!(text.contains("href=\"file:///home/me/Pictures/a.png\""));
        assert!(text.contains("name=\"waysnap\""));
        assert!(text.contains("2024-05-21T10:00:00.000000Z"));
    }

    #[test]
    fn appends_to_existing_index_once() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("recently-used.xbel");
        add_recent_file(&index, "file:///a.png", now()).unwrap();
        add_recent_file(&index, "file:///b.png", now()).unwrap();
        add_recent_file(&index, "file:///a.png", now()).unwrap();

        let text = fs::read_to_string(&index).unwrap();
        assert_eq!(text.matches("<bookmark href=").count(), 2);
        assert_eq!(text.matches(XBEL_CLOSE).count(), 1);
    }

    #[test]
    fn listed_file_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("recently-used.xbel");
        let later = Utc.with_ymd_and_hms(2024, 5, 22, 8, 30, 0).unwrap();
        add_recent_file(&index, "file:///a.png", now()).unwrap();
        add_recent_file(&index, "file:///b.png", now()).unwrap();
        add_recent_file(&index, "file:///a.png", later).unwrap();

        let text = fs::read_to_string(&index).unwrap();
        let a_start = text.find("href=\"file:///a.png\"").unwrap();
        let a_entry = &text[a_start..a_start + text[a_start..].find("</bookmark>").unwrap()];
        assert!(a_entry.contains("added=\"2024-05-21T10:00:00.000000Z\""));
        assert!(a_entry.contains("modified=\"2024-05-22T08:30:00.000000Z\""));
        assert!(a_entry.contains("visited=\"2024-05-22T08:30:00.000000Z\""));
        assert!(a_entry.contains("count=\"2\""));
        assert!(!a_entry.contains("count=\"1\""));

        let b_start = text.find("href=\"file:///b.png\"").unwrap();
        let b_entry = &text[b_start..b_start + text[b_start..].find("</bookmark>").unwrap()];
        assert!(b_entry.contains("count=\"1\""));
        assert!(!b_entry.contains("2024-05-22"));
    }

    #[test]
    fn refresh_adds_our_application_to_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("recently-used.xbel");
        let foreign = format!(
            concat!(
                "{}",
                "  <bookmark href=\"file:///c.png\" added=\"x\" modified=\"x\" visited=\"x\">\n",
                "    <info><metadata owner=\"http://freedesktop.org\">\n",
                "        <bookmark:applications>\n",
                "          <bookmark:application name=\"eog\" exec=\"eog\" modified=\"x\" count=\"4\"/>\n",
                "        </bookmark:applications>\n",
                "    </metadata></info>\n",
                "  </bookmark>\n",
                "</xbel>\n"
            ),
            XBEL_HEADER
        );
        fs::write(&index, foreign).unwrap();
        add_recent_file(&index, "file:///c.png", now()).unwrap();

        let text = fs::read_to_string(&index).unwrap();
        assert_eq!(text.matches("<bookmark href=").count(), 1);
        assert!(text.contains("name=\"eog\" exec=\"eog\" modified=\"x\" count=\"4\""));
        assert!(text.contains("name=\"waysnap\""));
        assert!(text.contains("visited=\"2024-05-21T10:00:00.000000Z\""));
    }

    #[test]
    fn set_attr_replaces_or_appends() {
        assert_eq!(set_attr("<a b=\"1\">", "b", "2"), "<a b=\"2\">");
        assert_eq!(set_attr("<a b=\"1\"/>", "c", "3"), "<a b=\"1\" c=\"3\"/>");
    }

    #[test]
    fn refuses_to_rewrite_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("recently-used.xbel");
        fs::write(&index, "not xml").unwrap();
        assert!(add_recent_file(&index, "file:///a.png", now()).is_err());
        assert_eq!(fs::read_to_string(&index).unwrap(), "not xml");
    }

    #[test]
    fn escapes_markup_in_uris() {
        assert_eq!(escape("file:///a&b<c>.png"), "file:///a&amp;b&lt;c&gt;.png");
    }
}
