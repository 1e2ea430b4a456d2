//! Request methods and response status codes.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether a request body is meaningful for this method.
    pub fn allows_payload(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five RFC 7231 status classes, plus a bucket for out-of-range codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFamily {
    Informational,
    Successful,
    Redirection,
    ClientError,
    ServerError,
    Unknown,
}

impl StatusFamily {
    pub fn of(code: u16) -> Self {
        match code / 100 {
            1 => StatusFamily::Informational,
            2 => StatusFamily::Successful,
            3 => StatusFamily::Redirection,
            4 => StatusFamily::ClientError,
            5 => StatusFamily::ServerError,
            _ => StatusFamily::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(u16);

impl Status {
    pub const OK: Status = Status(200);
    pub const NO_CONTENT: Status = Status(204);
    pub const UNAUTHORIZED: Status = Status(401);
    pub const NOT_FOUND: Status = Status(404);

    pub fn new(code: u16) -> Self {
        Status(code)
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    pub fn family(&self) -> StatusFamily {
        StatusFamily::of(self.0)
    }

    pub fn is_success(&self) -> bool {
        self.family() == StatusFamily::Successful
    }

    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = self.reason();
        if reason.is_empty() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{} {}", self.0, reason)
        }
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Status(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_families() {
        assert_eq!(Status::new(204).family(), StatusFamily::Successful);
        assert_eq!(Status::new(301).family(), StatusFamily::Redirection);
        assert_eq!(Status::new(404).family(), StatusFamily::ClientError);
        assert_eq!(Status::new(503).family(), StatusFamily::ServerError);
        assert_eq!(Status::new(999).family(), StatusFamily::Unknown);
        assert!(Status::OK.is_success());
        assert!(!Status::UNAUTHORIZED.is_success());
    }

    #[test]
    fn method_display() {
        assert_eq!(Method::Delete.to_string(), "DELETE");
        assert!(Method::Post.allows_payload());
        assert!(!Method::Get.allows_payload());
    }
}
