use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Kind of a listing line, from the first character of its permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    /// Symbolic link; the target kind is unknown until checked
    FileLink,
    DirectoryLink,
    Block,
    Character,
    Socket,
    Fifo,
    Other,
}

impl EntryKind {
    pub fn from_type_char(c: char) -> Self {
        match c {
            '-' => Self::File,
            'd' => Self::Directory,
            'l' => Self::FileLink,
            'b' => Self::Block,
            'c' => Self::Character,
            's' => Self::Socket,
            'p' => Self::Fifo,
            _ => Self::Other,
        }
    }
}

/// Permission bits parsed from an `ls -l` mode string
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mode(u32);

bitflags! {
    impl Mode: u32 {
        const SETUID = 0o4000;
        const SETGID = 0o2000;
        const STICKY = 0o1000;
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
    }
}

impl Mode {
    /// Parses `drwxr-x--x`-style text. The type character is skipped and
    /// anything after the nine permission characters is ignored.
    pub fn parse(permissions: &str) -> Option<Self> {
        const TRIPLETS: [(Mode, Mode, Mode, Mode); 3] = [
            (Mode::OWNER_READ, Mode::OWNER_WRITE, Mode::OWNER_EXEC, Mode::SETUID),
            (Mode::GROUP_READ, Mode::GROUP_WRITE, Mode::GROUP_EXEC, Mode::SETGID),
            (Mode::OTHER_READ, Mode::OTHER_WRITE, Mode::OTHER_EXEC, Mode::STICKY),
        ];

        let chars: Vec<char> = permissions.chars().skip(1).take(9).collect();
        if chars.len() != 9 {
            return None;
        }

        let mut mode = Self::empty();
        for (triplet, (read, write, exec, special)) in chars.chunks(3).zip(TRIPLETS) {
            match triplet[0] {
                'r' => mode |= read,
                '-' => {}
                _ => return None,
            }
            match triplet[1] {
                'w' => mode |= write,
                '-' => {}
                _ => return None,
            }
            match triplet[2] {
                'x' => mode |= exec,
                's' | 't' => mode |= exec | special,
                'S' | 'T' => mode |= special,
                '-' => {}
                _ => return None,
            }
        }

        Some(mode)
    }
}

/// One line of a directory listing.
///
/// Snapshots are never mutated; listing a directory again produces new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub(crate) full_path: String,
    pub(crate) kind: EntryKind,
    pub(crate) permissions: Option<String>,
    pub(crate) owner: Option<String>,
    pub(crate) group: Option<String>,
    pub(crate) date: Option<String>,
    pub(crate) time: Option<String>,
    pub(crate) size: Option<u64>,
    pub(crate) extra_info: Option<String>,
}

macro_rules! impl_fn_kind {
    ($name:ident, $doc_name:expr, $($kind:ident)|+) => {
        #[doc = "Returns `true` if the entry is a "]
        #[doc = $doc_name]
        pub fn $name(&self) -> bool {
            matches!(self.kind, $(EntryKind::$kind)|+)
        }
    };
}

impl ListingEntry {
    pub fn new<T: Into<String>>(full_path: T, kind: EntryKind) -> Self {
        Self {
            full_path: full_path.into(),
            kind,
            permissions: None,
            owner: None,
            group: None,
            date: None,
            time: None,
            size: None,
            extra_info: None,
        }
    }

    /// Entry of the file system root, which no listing produces.
    pub fn root() -> Self {
        Self::new("/", EntryKind::Directory)
    }

    impl_fn_kind!(is_directory, "directory or a link to one", Directory | DirectoryLink);
    impl_fn_kind!(is_file, "file or a link to one", File | FileLink);
    impl_fn_kind!(is_symbolic_link, "symbolic link", FileLink | DirectoryLink);
    impl_fn_kind!(is_device, "block or character device", Block | Character);

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Last segment of the path, empty for the root.
    pub fn name(&self) -> &str {
        self.full_path
            .rsplit_once('/')
            .map_or(self.full_path.as_str(), |(_, name)| name)
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn permissions(&self) -> Option<&str> {
        self.permissions.as_deref()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.permissions.as_deref().and_then(Mode::parse)
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    /// Device-local modification time, minute precision.
    pub fn last_modified(&self) -> Option<NaiveDateTime> {
        let text = format!("{} {}", self.date.as_deref()?, self.time.as_deref()?);
        NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M").ok()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Size in bytes, `0` when the listing had none.
    pub fn byte_size(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    /// Link target for symbolic links.
    pub fn extra_info(&self) -> Option<&str> {
        self.extra_info.as_deref()
    }

    /// Copy of a link entry whose target was found to be a directory.
    pub fn into_directory_link(mut self) -> Self {
        if self.kind == EntryKind::FileLink {
            self.kind = EntryKind::DirectoryLink;
        }
        self
    }
}
