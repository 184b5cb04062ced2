//! Roman-numeral / chord-symbol parsing.
//!
//! Pure function: symbol text + current key → scale-degree chord, plus a new
//! key when the symbol tonicizes (applied/secondary chords). Chromatic
//! chords come back with per-tone semitone offsets attached. Unsupported
//! input returns `None`; the caller keeps the previously established harmony
//! in that case.

use tracing::warn;

use super::chord::ChordInScale;
use super::scale::{Key, Scale};

/// Chord quality, used only to select the interval table for chromatic
/// perturbation math — the degree set itself comes from the figured bass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quality {
    Major,
    Minor,
    Diminished,
    HalfDiminished,
}

impl Quality {
    /// Stacked-third semitone targets above the chord root, up to five tones.
    fn intervals(self) -> [i32; 5] {
        match self {
            Quality::Major => [0, 4, 7, 10, 14],
            Quality::Minor => [0, 3, 7, 10, 14],
            Quality::Diminished => [0, 3, 6, 9, 12],
            Quality::HalfDiminished => [0, 3, 6, 10, 14],
        }
    }
}

/// Fixed-pitch augmented-sixth chords: (symbol, degrees bass-first,
/// target semitones above the tonic per tone).
const AUGMENTED_SIXTHS: [(&str, &[i32], &[i32]); 5] = [
    ("It6", &[5, 0, 3], &[8, 0, 6]),
    ("Ger6/5", &[5, 0, 2, 3], &[8, 0, 3, 6]),
    ("Ger7", &[5, 0, 2, 3], &[8, 0, 3, 6]),
    ("Fr4/3", &[5, 0, 1, 3], &[8, 0, 2, 6]),
    ("Fr6", &[5, 0, 1, 3], &[8, 0, 2, 6]),
];

/// Parse a roman-numeral chord symbol against `key`.
///
/// Returns the chord and, for applied chords like `V/V`, the tonicized key
/// (which per caller contract persists until the next explicit key change).
/// Unparseable symbols yield `None`.
pub fn parse(text: &str, key: &Key) -> Option<(ChordInScale, Option<Key>)> {
    let text = strip_annotations(text.trim());
    if text.is_empty() {
        return None;
    }

    if let Some(chord) = parse_augmented_sixth(&text, key) {
        return Some((chord, None));
    }

    // Neapolitan aliases; any other N-form is unsupported.
    let text = match text.as_str() {
        "N" => "bII".to_string(),
        "N6" => "bII6".to_string(),
        other if other.starts_with('N') => return None,
        other => other.to_string(),
    };

    let (head, rest) = parse_head(&text)?;
    let (quality, rest) = parse_quality(rest, head.minor);
    let (figure, applied) = split_applied(rest);

    let new_key = match applied {
        Some(target) => Some(tonicize(&target, key)?),
        None => None,
    };
    let effective_key = new_key.as_ref().unwrap_or(key);

    let (size, inversion) = figure_table(figure);
    let degrees: Vec<i32> = (0..size).map(|k| head.degree + 2 * k as i32).collect();

    let mut chord = ChordInScale::new(degrees.clone(), inversion);
    if head.accidental != 0 {
        let root_semitones =
            effective_key.scale.degree_semitones(head.degree) + head.accidental;
        let intervals = quality.intervals();
        let offsets: Vec<i32> = degrees
            .iter()
            .enumerate()
            .map(|(k, &d)| root_semitones + intervals[k] - effective_key.scale.degree_semitones(d))
            .collect();
        chord = chord.with_offsets(offsets);
    }

    Some((chord, new_key))
}

/// Parse against `key`, logging and keeping silence on failure.
///
/// Convenience wrapper for the degrade-gracefully policy: callers that hit
/// an unsupported symbol retain their previous harmony.
pub fn parse_or_warn(text: &str, key: &Key) -> Option<(ChordInScale, Option<Key>)> {
    let parsed = parse(text, key);
    if parsed.is_none() {
        warn!(symbol = text, "unsupported chord symbol, harmony unchanged");
    }
    parsed
}

/// Drop bracketed analytical annotations: `V9[b9]` → `V9`.
fn strip_annotations(text: &str) -> String {
    match (text.find('['), text.rfind(']')) {
        (Some(open), Some(close)) if close > open => {
            format!("{}{}", &text[..open], &text[close + 1..])
        }
        _ => text.to_string(),
    }
}

fn parse_augmented_sixth(text: &str, key: &Key) -> Option<ChordInScale> {
    let (_, degrees, targets) = AUGMENTED_SIXTHS.iter().find(|(sym, _, _)| *sym == text)?;
    let offsets: Vec<i32> = degrees
        .iter()
        .zip(targets.iter())
        .map(|(&d, &t)| t - key.scale.degree_semitones(d))
        .collect();
    Some(ChordInScale::new(degrees.to_vec(), 0).with_offsets(offsets))
}

struct Head {
    degree: i32,
    accidental: i32,
    minor: bool,
}

/// Consume an optional accidental and the roman-numeral letters.
fn parse_head(text: &str) -> Option<(Head, &str)> {
    let (accidental, rest) = if let Some(r) = text.strip_prefix('b') {
        (-1, r)
    } else if let Some(r) = text.strip_prefix('#') {
        (1, r)
    } else {
        (0, text)
    };

    let letters: String = rest
        .chars()
        .take_while(|c| matches!(c, 'I' | 'V' | 'i' | 'v'))
        .collect();
    if letters.is_empty() {
        return None;
    }
    let minor = letters.chars().next().is_some_and(|c| c.is_lowercase());

    let degree = match letters.to_uppercase().as_str() {
        "I" => 0,
        "II" => 1,
        "III" => 2,
        "IV" => 3,
        "V" => 4,
        "VI" => 5,
        "VII" => 6,
        _ => return None,
    };

    Some((
        Head {
            degree,
            accidental,
            minor,
        },
        &rest[letters.len()..],
    ))
}

/// Consume a diminished / half-diminished marker after the letters.
fn parse_quality(text: &str, minor: bool) -> (Quality, &str) {
    if let Some(rest) = text.strip_prefix("/o").or_else(|| text.strip_prefix('ø')) {
        (Quality::HalfDiminished, rest)
    } else if let Some(rest) = text.strip_prefix('o') {
        (Quality::Diminished, rest)
    } else if minor {
        (Quality::Minor, text)
    } else {
        (Quality::Major, text)
    }
}

/// Split an applied-chord target off the figured-bass suffix.
///
/// The text after the last `/` counts as a target only when it is itself a
/// complete accidental + roman-numeral head (`"V7/V"` → figure `"7"`,
/// target `"V"`; `"6/5"` stays a figure).
fn split_applied(text: &str) -> (&str, Option<&str>) {
    if let Some(slash) = text.rfind('/') {
        let candidate = &text[slash + 1..];
        if let Some((_, rest)) = parse_head(candidate) {
            if rest.is_empty() {
                return (&text[..slash], Some(candidate));
            }
        }
    }
    (text, None)
}

/// Figured-bass suffix → (chord size, inversion). Stacked figures are
/// accepted with or without the slash (`"6/4"` and `"64"` name the same
/// voicing). Unrecognized → root triad.
fn figure_table(figure: &str) -> (usize, i32) {
    match figure {
        "" => (3, 0),
        "6" => (3, 1),
        "6/4" | "64" => (3, 2),
        "7" => (4, 0),
        "6/5" | "65" => (4, 1),
        "4/3" | "43" => (4, 2),
        "2" | "4/2" | "42" => (4, 3),
        "9" => (5, 0),
        _ => (3, 0),
    }
}

/// Resolve an applied target into its tonicized key.
///
/// The target's diatonic semitone offset (plus its own accidental) moves the
/// root; spelling comes from the flat-preference table; mode follows the
/// letter case — major for uppercase, harmonic minor for lowercase so that
/// secondary dominants of minor targets carry a leading tone.
fn tonicize(target: &str, key: &Key) -> Option<Key> {
    let (head, rest) = parse_head(target)?;
    if !rest.is_empty() {
        return None;
    }
    let offset = key.scale.degree_semitones(head.degree) + head.accidental;
    let scale = if head.minor {
        Scale::named("harmonic minor")
    } else {
        Scale::named("major")
    }?;
    Some(Key::new(key.root.shifted(offset), scale))
}
