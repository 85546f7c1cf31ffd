//! Redis-style glob matching for SCAN MATCH and PSUBSCRIBE.
//!
//! Supports `*`, `?`, `[...]` classes with ranges and `^` negation, and `\`
//! escapes.

pub fn glob_match(
    pattern: &str,
    subject: &str,
) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let subject: Vec<char> = subject.chars().collect();
    match_from(&pattern, &subject)
}

fn match_from(
    pattern: &[char],
    subject: &[char],
) -> bool {
    let Some((&p, rest)) = pattern.split_first() else {
        return subject.is_empty();
    };

    match p {
        '*' => {
            if rest.is_empty() {
                return true;
            }
            (0..=subject.len()).any(|skip| match_from(rest, &subject[skip..]))
        }
        '?' => !subject.is_empty() && match_from(rest, &subject[1..]),
        '[' => {
            let Some((&c, tail)) = subject.split_first() else {
                return false;
            };
            let (matched, rest) = match_class(rest, c);
            matched && match_from(rest, tail)
        }
        '\\' if !rest.is_empty() => {
            subject.first() == Some(&rest[0]) && match_from(&rest[1..], &subject[1..])
        }
        literal => subject.first() == Some(&literal) && match_from(rest, &subject[1..]),
    }
}

// Consumes a class body up to and including `]`, returning whether `c`
// matched and the remaining pattern.
fn match_class(
    class: &[char],
    c: char,
) -> (bool, &[char]) {
    let (negated, mut body) = match class.split_first() {
        Some(('^', tail)) => (true, tail),
        _ => (false, class),
    };

    let mut matched = false;
    loop {
        match body {
            [] => break,
            [']', tail @ ..] => {
                body = tail;
                break;
            }
            ['\\', escaped, tail @ ..] => {
                matched |= *escaped == c;
                body = tail;
            }
            [start, '-', end, tail @ ..] if *end != ']' => {
                let (low, high) = if start <= end { (*start, *end) } else { (*end, *start) };
                matched |= (low..=high).contains(&c);
                body = tail;
            }
            [single, tail @ ..] => {
                matched |= *single == c;
                body = tail;
            }
        }
    }

    (matched != negated, body)
}
