use std::fmt;

/// What a standard stream is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Terminal or other character device.
    CharDevice,
    /// Regular file.
    File,
    /// Anonymous or named pipe.
    Pipe,
    /// Socket standing in for a file.
    Socket,
    /// Closed, remote, or anything else.
    Unknown,
}

impl StreamKind {
    /// One-character marker used in report tags.
    pub fn symbol(self) -> char {
        match self {
            StreamKind::CharDevice => '*',
            StreamKind::File => '+',
            StreamKind::Pipe => '|',
            StreamKind::Socket => '&',
            StreamKind::Unknown => '?',
        }
    }

    /// Classify this process's standard error.
    #[cfg(unix)]
    pub fn of_stderr() -> Self {
        use std::os::fd::AsFd;

        let stderr = std::io::stderr();
        let Ok(fd) = stderr.as_fd().try_clone_to_owned() else {
            return StreamKind::Unknown;
        };
        match std::fs::File::from(fd).metadata() {
            Ok(metadata) => Self::from_file_type(metadata.file_type()),
            Err(_) => StreamKind::Unknown,
        }
    }

    #[cfg(not(unix))]
    pub fn of_stderr() -> Self {
        StreamKind::Unknown
    }

    #[cfg(unix)]
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;

        if file_type.is_char_device() {
            StreamKind::CharDevice
        } else if file_type.is_fifo() {
            StreamKind::Pipe
        } else if file_type.is_socket() {
            StreamKind::Socket
        } else if file_type.is_file() {
            StreamKind::File
        } else {
            StreamKind::Unknown
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::CharDevice => "char-device",
            StreamKind::File => "file",
            StreamKind::Pipe => "pipe",
            StreamKind::Socket => "socket",
            StreamKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
