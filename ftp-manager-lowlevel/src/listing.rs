//! Directory entries of a `LIST` reply.
//!
//! Lines are parsed with [`suppaftp::list::File`], which understands UNIX
//! `ls -l` and DOS/IIS listings. Lines matching neither become an entry
//! of [`FileType::Unknown`] named after the whole line.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use suppaftp::list::{File, PosixPexQuery};

/// Keys of the metadata attached to a [`DirectoryEntry`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ResourceKey {
    Type,
    Size,
    /// Octal permission bits, e.g. `644`.
    Mode,
    Owner,
    Group,
    /// Target of a symlink.
    Link,
    /// Modification time in seconds since the UNIX epoch.
    ModDate,
}

/// Type of a [`DirectoryEntry`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    Unknown,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
            FileType::Unknown => "unknown",
        }
    }

    fn from_resource(s: &str) -> Self {
        match s {
            "file" => FileType::File,
            "directory" => FileType::Directory,
            "symlink" => FileType::Symlink,
            _ => FileType::Unknown,
        }
    }

    pub fn is_dir(self) -> bool {
        self == FileType::Directory
    }

    pub fn is_file(self) -> bool {
        self == FileType::File
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirectoryEntry {
    name: String,
    resources: BTreeMap<ResourceKey, String>,
    raw: String,
}

impl DirectoryEntry {
    fn new(name: impl Into<String>, raw: &str) -> Self {
        Self {
            name: name.into(),
            resources: BTreeMap::new(),
            raw: raw.to_owned(),
        }
    }

    fn with(mut self, key: ResourceKey, value: impl Into<String>) -> Self {
        self.resources.insert(key, value.into());
        self
    }

    fn from_file(file: &File, raw: &str) -> Self {
        let file_type = if file.is_symlink() {
            FileType::Symlink
        } else if file.is_directory() {
            FileType::Directory
        } else if file.is_file() {
            FileType::File
        } else {
            FileType::Unknown
        };

        let mut entry = Self::new(file.name(), raw)
            .with(ResourceKey::Type, file_type.as_str())
            .with(ResourceKey::Size, file.size().to_string());

        // DOS listings carry no permissions.
        if has_permissions(raw) {
            entry = entry.with(ResourceKey::Mode, format!("{:o}", mode_of(file)));
        }
        if let Some(uid) = file.uid() {
            entry = entry.with(ResourceKey::Owner, uid.to_string());
        }
        if let Some(gid) = file.gid() {
            entry = entry.with(ResourceKey::Group, gid.to_string());
        }
        if let Some(target) = file.symlink() {
            entry = entry.with(ResourceKey::Link, target.to_string_lossy());
        }
        if let Ok(since_epoch) = file.modified().duration_since(UNIX_EPOCH) {
            entry = entry.with(ResourceKey::ModDate, since_epoch.as_secs().to_string());
        }

        entry
    }

    /// Name of the entry, decoded as UTF-8.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw metadata as provided by the listing.
    pub fn resources(&self) -> &BTreeMap<ResourceKey, String> {
        &self.resources
    }

    pub fn get(&self, key: ResourceKey) -> Option<&str> {
        self.resources.get(&key).map(String::as_str)
    }

    pub fn file_type(&self) -> FileType {
        self.get(ResourceKey::Type)
            .map(FileType::from_resource)
            .unwrap_or(FileType::Unknown)
    }

    /// Size in bytes, if the listing reported one.
    pub fn len(&self) -> Option<u64> {
        self.get(ResourceKey::Size)?.parse().ok()
    }

    /// Permission bits, if the listing reported them.
    pub fn mode(&self) -> Option<u32> {
        u32::from_str_radix(self.get(ResourceKey::Mode)?, 8).ok()
    }

    pub fn owner(&self) -> Option<&str> {
        self.get(ResourceKey::Owner)
    }

    pub fn group(&self) -> Option<&str> {
        self.get(ResourceKey::Group)
    }

    pub fn link_target(&self) -> Option<&str> {
        self.get(ResourceKey::Link)
    }

    pub fn modified(&self) -> Option<SystemTime> {
        let secs = self.get(ResourceKey::ModDate)?.parse().ok()?;
        UNIX_EPOCH.checked_add(Duration::from_secs(secs))
    }

    /// The listing line this entry was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Turn the lines of a `LIST` reply into entries, skipping `.` and `..`.
pub fn parse_listing<I, S>(lines: I) -> Vec<DirectoryEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_listing_line(line.as_ref()))
        .filter(|entry| entry.name != "." && entry.name != "..")
        .collect()
}

/// Parse one line of a listing.
///
/// Return `None` for lines carrying no entry, i.e. empty lines and the
/// `total N` header.
pub fn parse_listing_line(line: &str) -> Option<DirectoryEntry> {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');

    if line.trim().is_empty() || is_total_line(line) {
        return None;
    }

    match File::from_str(line) {
        Ok(file) => Some(DirectoryEntry::from_file(&file, line)),
        Err(err) => {
            tracing::trace!(?err, line, "unrecognized listing line");
            Some(DirectoryEntry::new(line, line).with(ResourceKey::Type, FileType::Unknown.as_str()))
        }
    }
}

fn is_total_line(line: &str) -> bool {
    let mut fields = line.split_whitespace();

    fields.next() == Some("total")
        && fields.next().map_or(false, |n| n.parse::<u64>().is_ok())
        && fields.next().is_none()
}

/// `ls -l` lines start with a type character and nine permission flags.
fn has_permissions(line: &str) -> bool {
    let bytes = line.as_bytes();

    bytes.len() > 10
        && b"-dlcbps".contains(&bytes[0])
        && bytes[1..10].iter().all(|b| b"-rwxsStT".contains(b))
}

fn mode_of(file: &File) -> u32 {
    [PosixPexQuery::Owner, PosixPexQuery::Group, PosixPexQuery::Others]
        .into_iter()
        .fold(0, |mode, who| {
            let bits = u32::from(file.can_read(who)) << 2
                | u32::from(file.can_write(who)) << 1
                | u32::from(file.can_execute(who));

            mode << 3 | bits
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn unix_file() {
        let entry =
            parse_listing_line("-rw-r--r--   1 1000 1001   100000 Jan 10 12:00 report.txt").unwrap();

        assert_eq!(entry.name(), "report.txt");
        assert_eq!(entry.file_type(), FileType::File);
        assert_eq!(entry.len(), Some(100000));
        assert_eq!(entry.mode(), Some(0o644));
        assert_eq!(entry.owner(), Some("1000"));
        assert_eq!(entry.group(), Some("1001"));
        assert!(entry.modified().is_some());
    }

    #[test]
    fn unix_directory_with_spaces() {
        let entry =
            parse_listing_line("drwxr-xr-x 2 ftp ftp 4096 Mar 14  2024 my folder\r\n").unwrap();

        assert_eq!(entry.name(), "my folder");
        assert!(entry.file_type().is_dir());
        assert_eq!(entry.mode(), Some(0o755));
        assert_eq!(entry.owner(), None);
    }

    #[test]
    fn unix_symlink() {
        let entry =
            parse_listing_line("lrwxrwxrwx 1 root root 7 Feb 03 09:15 latest -> v1.2.3").unwrap();

        assert_eq!(entry.name(), "latest");
        assert_eq!(entry.file_type(), FileType::Symlink);
        assert_eq!(entry.link_target(), Some("v1.2.3"));
    }

    #[test]
    fn dos_entries() {
        let dir = parse_listing_line("01-01-26  12:00AM       <DIR>          Photos").unwrap();
        assert_eq!(dir.name(), "Photos");
        assert!(dir.file_type().is_dir());
        assert_eq!(dir.mode(), None);

        let file = parse_listing_line("11-30-25  03:41PM            1234 notes 2.txt").unwrap();
        assert_eq!(file.name(), "notes 2.txt");
        assert!(file.file_type().is_file());
        assert_eq!(file.len(), Some(1234));
        assert_eq!(file.mode(), None);
    }

    #[test]
    fn unknown_format_keeps_line() {
        let entry = parse_listing_line("something odd").unwrap();

        assert_eq!(entry.name(), "something odd");
        assert_eq!(entry.raw(), "something odd");
        assert_eq!(entry.file_type(), FileType::Unknown);
        assert_eq!(entry.len(), None);
    }

    #[test]
    fn full_listing() {
        let lines = [
            "total 8",
            "drwxr-xr-x 2 ftp ftp 4096 Jan 01 12:00 .",
            "drwxr-xr-x 2 ftp ftp 4096 Jan 01 12:00 ..",
            "-rw-r--r-- 1 ftp ftp    3 Jan 01 12:00 Grüße.txt",
            "-rw-r--r-- 1 ftp ftp    5 Jan 01 12:00 日本.bin",
        ];

        let entries = parse_listing(lines);
        let names: Vec<_> = entries.iter().map(DirectoryEntry::name).collect();

        assert_eq!(names, ["Grüße.txt", "日本.bin"]);
    }

    #[test]
    fn empty_listing() {
        assert!(parse_listing(Vec::<String>::new()).is_empty());
        assert!(parse_listing(["total 0", ""]).is_empty());
    }

    #[test]
    fn permission_columns() {
        assert!(has_permissions("-rw-r--r-- 1 ftp ftp 1 Jan 01 12:00 a"));
        assert!(has_permissions("drwxrwxrwt 1 ftp ftp 1 Jan 01 12:00 tmp"));
        assert!(!has_permissions("01-01-26  12:00AM       <DIR>          Photos"));
        assert!(!has_permissions("total 0"));
    }
}
