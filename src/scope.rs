use std::fmt::Display;

/// The scopes the bridge asks for when none are given explicitly.
pub const DEFAULT_SCOPES: [Scope; 2] = [Scope::UserReadPlaybackState, Scope::UserReadCurrentlyPlaying];

pub trait ToScopesString {
    fn to_scopes_string(self) -> String;
}

/// OAuth authorization scopes relevant to reading and controlling playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    UserReadPlaybackState,
    UserReadCurrentlyPlaying,
    UserModifyPlaybackState,
    UserReadRecentlyPlayed,
    Streaming,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::UserReadPlaybackState => "user-read-playback-state",
            Scope::UserReadCurrentlyPlaying => "user-read-currently-playing",
            Scope::UserModifyPlaybackState => "user-modify-playback-state",
            Scope::UserReadRecentlyPlayed => "user-read-recently-played",
            Scope::Streaming => "streaming",
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<I> ToScopesString for I
where
    I: IntoIterator<Item = Scope>,
{
    fn to_scopes_string(self) -> String {
        self.into_iter().map(Scope::as_str).collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scopes_string() {
        assert_eq!(
            DEFAULT_SCOPES.to_scopes_string(),
            "user-read-playback-state user-read-currently-playing"
        );
    }

    #[test]
    fn empty_scopes_string() {
        assert_eq!(Vec::<Scope>::new().to_scopes_string(), "");
    }
}
