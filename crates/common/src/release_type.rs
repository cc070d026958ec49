#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Refinement {
    Live,
    Remix,
}

/// Release type of an album, following MusicBrainz primary and secondary types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseType {
    Album(Option<Refinement>),
    Ep(Option<Refinement>),
    Single(Option<Refinement>),
    Compilation(Option<Refinement>),
    Soundtrack,
    Mix,
    Mixtape,
    Demo,
}

impl Default for ReleaseType {
    fn default() -> Self {
        ReleaseType::Album(None)
    }
}

impl ReleaseType {
    /// Parses a primary type followed by secondary types. Orphan secondary
    /// types are treated as albums.
    pub fn parse(types: &[String]) -> Option<Self> {
        let primary = types.first()?;
        let parsed = if primary.eq_ignore_ascii_case("album") {
            parse_secondary(types, 1, ReleaseType::Album)
        } else if primary.eq_ignore_ascii_case("ep") {
            parse_secondary(types, 1, ReleaseType::Ep)
        } else if primary.eq_ignore_ascii_case("single") {
            parse_secondary(types, 1, ReleaseType::Single)
        } else {
            parse_secondary(types, 0, ReleaseType::Album)
        };
        Some(parsed)
    }

    pub fn refinement(&self) -> Option<Refinement> {
        match self {
            ReleaseType::Album(refinement)
            | ReleaseType::Ep(refinement)
            | ReleaseType::Single(refinement)
            | ReleaseType::Compilation(refinement) => *refinement,
            _ => None,
        }
    }
}

fn parse_secondary(
    types: &[String],
    index: usize,
    convert: fn(Option<Refinement>) -> ReleaseType,
) -> ReleaseType {
    let secondary = types.get(index).map(String::as_str);
    match secondary {
        Some(value) if value.eq_ignore_ascii_case("compilation") => parse_terminal(
            types.get(index + 1).map(String::as_str),
            ReleaseType::Compilation,
        ),
        _ => parse_terminal(secondary, convert),
    }
}

fn parse_terminal(
    value: Option<&str>,
    convert: fn(Option<Refinement>) -> ReleaseType,
) -> ReleaseType {
    let value = match value {
        Some(value) => value.to_ascii_lowercase(),
        None => return convert(None),
    };
    match value.as_str() {
        "soundtrack" => ReleaseType::Soundtrack,
        "mixtape/street" => ReleaseType::Mixtape,
        "dj-mix" => ReleaseType::Mix,
        "demo" => ReleaseType::Demo,
        "live" => convert(Some(Refinement::Live)),
        "remix" => convert(Some(Refinement::Remix)),
        _ => convert(None),
    }
}
