//! Storage keys and their normalized form.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// A key as callers hand it to a storage.
///
/// A key is a scalar segment or an ordered sequence of segments; nested
/// sequences flatten, so `("1", "3", ("4",))` addresses `1/3/4`. Text
/// segments may themselves contain `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Text(String),
    Path(PathBuf),
    Int(i64),
    Seq(Vec<Key>),
}

impl Key {
    /// Validate and flatten into a [`KeyPath`].
    ///
    /// Fails with a usage error for the empty key, any `..` segment, and
    /// any absolute segment.
    pub fn normalize(&self) -> Result<KeyPath> {
        let mut segments = Vec::new();
        self.push_segments(&mut segments)?;
        if segments.is_empty() {
            return Err(Error::usage(format!("empty key: {:?}", self)));
        }
        Ok(KeyPath { segments })
    }

    fn push_segments(&self, out: &mut Vec<String>) -> Result<()> {
        match self {
            Key::Text(text) => push_path(Path::new(text), out),
            Key::Path(path) => push_path(path, out),
            Key::Int(i) => {
                out.push(i.to_string());
                Ok(())
            }
            Key::Seq(items) => items.iter().try_for_each(|item| item.push_segments(out)),
        }
    }
}

fn push_path(path: &Path, out: &mut Vec<String>) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| {
                    Error::usage(format!("key segment is not valid UTF-8: {:?}", segment))
                })?;
                if segment.contains('\0') {
                    return Err(Error::usage(format!("key segment contains NUL: {:?}", segment)));
                }
                out.push(segment.to_string());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::usage(format!(
                    "key escapes storage root: {}",
                    path.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::usage(format!(
                    "key must be relative: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Text(v)
    }
}

impl From<&String> for Key {
    fn from(v: &String) -> Self {
        Key::Text(v.clone())
    }
}

impl From<PathBuf> for Key {
    fn from(v: PathBuf) -> Self {
        Key::Path(v)
    }
}

impl From<&Path> for Key {
    fn from(v: &Path) -> Self {
        Key::Path(v.to_path_buf())
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<Vec<Key>> for Key {
    fn from(v: Vec<Key>) -> Self {
        Key::Seq(v)
    }
}

impl From<&KeyPath> for Key {
    fn from(v: &KeyPath) -> Self {
        Key::Seq(v.segments.iter().cloned().map(Key::Text).collect())
    }
}

impl From<KeyPath> for Key {
    fn from(v: KeyPath) -> Self {
        Key::Seq(v.segments.into_iter().map(Key::Text).collect())
    }
}

impl<K: Into<Key>, const N: usize> From<[K; N]> for Key {
    fn from(v: [K; N]) -> Self {
        Key::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Key>> From<(A,)> for Key {
    fn from(v: (A,)) -> Self {
        Key::Seq(vec![v.0.into()])
    }
}

impl<A: Into<Key>, B: Into<Key>> From<(A, B)> for Key {
    fn from(v: (A, B)) -> Self {
        Key::Seq(vec![v.0.into(), v.1.into()])
    }
}

impl<A: Into<Key>, B: Into<Key>, C: Into<Key>> From<(A, B, C)> for Key {
    fn from(v: (A, B, C)) -> Self {
        Key::Seq(vec![v.0.into(), v.1.into(), v.2.into()])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Text(t) => write!(f, "{}", t),
            Key::Path(p) => write!(f, "{}", p.display()),
            Key::Int(i) => write!(f, "{}", i),
            Key::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("/")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

/// A validated, root-relative key: one or more plain segments.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Join onto a filesystem directory.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }

    /// The relative path this key denotes.
    pub fn as_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    #[must_use]
    pub fn join(&self, other: &KeyPath) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        KeyPath { segments }
    }

    /// The key one level up, or `None` for a single-segment key.
    pub fn parent(&self) -> Option<KeyPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(KeyPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn nested_sequences_flatten() {
        let a = Key::from(("1", "3", ("4",))).normalize().unwrap();
        let b = Key::from((PathBuf::from("1"), "3", ("4",))).normalize().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "1/3/4");
        assert_eq!(a, Key::from("1/3/4").normalize().unwrap());
    }

    #[test]
    fn scalars_are_coerced_to_text() {
        assert_eq!(Key::from(7i64).normalize().unwrap().segments(), ["7"]);
        assert_eq!(
            Key::from(("tenant", 42i64)).normalize().unwrap().to_string(),
            "tenant/42"
        );
    }

    #[test]
    fn escapes_are_rejected() {
        for key in [
            Key::from("../.."),
            Key::from("a/../../b"),
            Key::from(("a", "..")),
            Key::from("/abs/path"),
            Key::from(PathBuf::from("/abs/path")),
            Key::from(("ok", "/abs")),
        ] {
            let err = key.normalize().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Usage, "{:?}", key);
        }
    }

    #[test]
    fn empty_keys_are_rejected() {
        for key in [Key::from(""), Key::from("."), Key::Seq(vec![]), Key::from(("", ""))] {
            assert!(key.normalize().is_err(), "{:?}", key);
        }
    }

    #[test]
    fn key_path_helpers() {
        let k = Key::from("a/b/c").normalize().unwrap();
        assert_eq!(k.parent().unwrap().to_string(), "a/b");
        assert_eq!(
            k.to_path(Path::new("/root")),
            PathBuf::from("/root/a/b/c")
        );
        let joined = k.join(&Key::from("d").normalize().unwrap());
        assert_eq!(joined.len(), 4);
        assert!(Key::from("a").normalize().unwrap().parent().is_none());
    }
}
