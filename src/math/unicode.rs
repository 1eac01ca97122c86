//! Deterministic LaTeX → Unicode transliteration, the always-available
//! rendering path for math spans.

use std::collections::HashMap;
use std::sync::LazyLock;

const SYMBOLS: &[(&str, &str)] = &[
    // Greek, lowercase
    ("alpha", "α"),
    ("beta", "β"),
    ("gamma", "γ"),
    ("delta", "δ"),
    ("epsilon", "ε"),
    ("varepsilon", "ε"),
    ("zeta", "ζ"),
    ("eta", "η"),
    ("theta", "θ"),
    ("vartheta", "ϑ"),
    ("iota", "ι"),
    ("kappa", "κ"),
    ("lambda", "λ"),
    ("mu", "μ"),
    ("nu", "ν"),
    ("xi", "ξ"),
    ("omicron", "ο"),
    ("pi", "π"),
    ("varpi", "ϖ"),
    ("rho", "ρ"),
    ("varrho", "ϱ"),
    ("sigma", "σ"),
    ("varsigma", "ς"),
    ("tau", "τ"),
    ("upsilon", "υ"),
    ("phi", "φ"),
    ("varphi", "φ"),
    ("chi", "χ"),
    ("psi", "ψ"),
    ("omega", "ω"),
    // Greek, uppercase
    ("Gamma", "Γ"),
    ("Delta", "Δ"),
    ("Theta", "Θ"),
    ("Lambda", "Λ"),
    ("Xi", "Ξ"),
    ("Pi", "Π"),
    ("Sigma", "Σ"),
    ("Upsilon", "Υ"),
    ("Phi", "Φ"),
    ("Psi", "Ψ"),
    ("Omega", "Ω"),
    // Relations
    ("leq", "≤"),
    ("le", "≤"),
    ("geq", "≥"),
    ("ge", "≥"),
    ("leqslant", "≤"),
    ("geqslant", "≥"),
    ("neq", "≠"),
    ("ne", "≠"),
    ("approx", "≈"),
    ("equiv", "≡"),
    ("sim", "∼"),
    ("simeq", "≃"),
    ("cong", "≅"),
    ("propto", "∝"),
    ("ll", "≪"),
    ("gg", "≫"),
    ("perp", "⊥"),
    ("parallel", "∥"),
    ("mid", "∣"),
    // Binary operators
    ("times", "×"),
    ("div", "÷"),
    ("pm", "±"),
    ("mp", "∓"),
    ("cdot", "·"),
    ("ast", "∗"),
    ("star", "⋆"),
    ("circ", "∘"),
    ("bullet", "•"),
    ("oplus", "⊕"),
    ("otimes", "⊗"),
    ("wedge", "∧"),
    ("vee", "∨"),
    // Sets and logic
    ("in", "∈"),
    ("notin", "∉"),
    ("ni", "∋"),
    ("subset", "⊂"),
    ("subseteq", "⊆"),
    ("supset", "⊃"),
    ("supseteq", "⊇"),
    ("cup", "∪"),
    ("cap", "∩"),
    ("setminus", "∖"),
    ("emptyset", "∅"),
    ("varnothing", "∅"),
    ("forall", "∀"),
    ("exists", "∃"),
    ("nexists", "∄"),
    ("neg", "¬"),
    ("lnot", "¬"),
    ("land", "∧"),
    ("lor", "∨"),
    ("therefore", "∴"),
    ("because", "∵"),
    ("implies", "⇒"),
    ("iff", "⇔"),
    // Arrows
    ("to", "→"),
    ("rightarrow", "→"),
    ("leftarrow", "←"),
    ("gets", "←"),
    ("leftrightarrow", "↔"),
    ("Rightarrow", "⇒"),
    ("Leftarrow", "⇐"),
    ("Leftrightarrow", "⇔"),
    ("longrightarrow", "⟶"),
    ("longleftarrow", "⟵"),
    ("Longrightarrow", "⟹"),
    ("uparrow", "↑"),
    ("downarrow", "↓"),
    ("mapsto", "↦"),
    ("rightleftharpoons", "⇌"),
    // Big operators
    ("sum", "∑"),
    ("prod", "∏"),
    ("coprod", "∐"),
    ("int", "∫"),
    ("iint", "∬"),
    ("iiint", "∭"),
    ("oint", "∮"),
    ("bigcup", "⋃"),
    ("bigcap", "⋂"),
    // Misc
    ("infty", "∞"),
    ("partial", "∂"),
    ("nabla", "∇"),
    ("angle", "∠"),
    ("triangle", "△"),
    ("degree", "°"),
    ("prime", "′"),
    ("hbar", "ℏ"),
    ("ell", "ℓ"),
    ("Re", "ℜ"),
    ("Im", "ℑ"),
    ("aleph", "ℵ"),
    ("cdots", "⋯"),
    ("ldots", "…"),
    ("dots", "…"),
    ("vdots", "⋮"),
    ("ddots", "⋱"),
    ("checkmark", "✓"),
    // Delimiters
    ("langle", "⟨"),
    ("rangle", "⟩"),
    ("lfloor", "⌊"),
    ("rfloor", "⌋"),
    ("lceil", "⌈"),
    ("rceil", "⌉"),
    ("lvert", "|"),
    ("rvert", "|"),
    ("vert", "|"),
    ("lVert", "‖"),
    ("rVert", "‖"),
    ("Vert", "‖"),
    // Named functions keep their names
    ("sin", "sin"),
    ("cos", "cos"),
    ("tan", "tan"),
    ("cot", "cot"),
    ("sec", "sec"),
    ("csc", "csc"),
    ("arcsin", "arcsin"),
    ("arccos", "arccos"),
    ("arctan", "arctan"),
    ("sinh", "sinh"),
    ("cosh", "cosh"),
    ("tanh", "tanh"),
    ("log", "log"),
    ("ln", "ln"),
    ("lg", "lg"),
    ("exp", "exp"),
    ("lim", "lim"),
    ("max", "max"),
    ("min", "min"),
    ("sup", "sup"),
    ("inf", "inf"),
    ("det", "det"),
    ("gcd", "gcd"),
    ("deg", "deg"),
    ("mod", "mod"),
    ("bmod", "mod"),
];

static SYMBOL_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| SYMBOLS.iter().copied().collect());

const TEXT_WRAPPERS: &[&str] = &[
    "text", "textrm", "textbf", "textit", "textsf", "texttt", "mathrm", "mathbf", "mathit",
    "mathsf", "mathtt", "mathcal", "mathscr", "boldsymbol", "bm", "operatorname", "mbox", "hbox",
    "displaystyle", "textstyle", "emph",
];

/// Combining marks for accent commands, appended after the argument.
const ACCENTS: &[(&str, char)] = &[
    ("vec", '\u{20D7}'),
    ("overrightarrow", '\u{20D7}'),
    ("hat", '\u{0302}'),
    ("widehat", '\u{0302}'),
    ("bar", '\u{0305}'),
    ("overline", '\u{0305}'),
    ("dot", '\u{0307}'),
    ("ddot", '\u{0308}'),
    ("tilde", '\u{0303}'),
    ("widetilde", '\u{0303}'),
    ("underline", '\u{0332}'),
];

fn superscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' | '−' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        'n' => 'ⁿ',
        'i' => 'ⁱ',
        'x' => 'ˣ',
        'y' => 'ʸ',
        'T' => 'ᵀ',
        _ => return None,
    })
}

fn subscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' | '−' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'o' => 'ₒ',
        'x' => 'ₓ',
        'h' => 'ₕ',
        'i' => 'ᵢ',
        'j' => 'ⱼ',
        'k' => 'ₖ',
        'l' => 'ₗ',
        'm' => 'ₘ',
        'n' => 'ₙ',
        'p' => 'ₚ',
        'r' => 'ᵣ',
        's' => 'ₛ',
        't' => 'ₜ',
        'u' => 'ᵤ',
        'v' => 'ᵥ',
        _ => return None,
    })
}

fn blackboard(c: char) -> Option<char> {
    Some(match c {
        'R' => 'ℝ',
        'N' => 'ℕ',
        'Z' => 'ℤ',
        'Q' => 'ℚ',
        'C' => 'ℂ',
        'P' => 'ℙ',
        _ => return None,
    })
}

/// Transliterates one LaTeX expression. Unknown commands are dropped,
/// their brace arguments kept.
pub fn to_unicode(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut pos = 0usize;
    let out = convert(&chars, &mut pos, false);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn convert(chars: &[char], pos: &mut usize, until_close: bool) -> String {
    let mut out = String::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        match c {
            '}' if until_close => {
                *pos += 1;
                return out;
            }
            '}' => *pos += 1,
            '{' => {
                *pos += 1;
                out.push_str(&convert(chars, pos, true));
            }
            '\\' => {
                *pos += 1;
                out.push_str(&command(chars, pos));
            }
            '^' | '_' => {
                *pos += 1;
                let arg = argument(chars, pos);
                out.push_str(&script(&arg, c == '^'));
            }
            '&' | '~' => {
                *pos += 1;
                out.push(' ');
            }
            '-' => {
                *pos += 1;
                out.push('−');
            }
            _ => {
                *pos += 1;
                out.push(c);
            }
        }
    }
    out
}

/// Reads one argument: a brace group, a command, or a single character.
fn argument(chars: &[char], pos: &mut usize) -> String {
    while *pos < chars.len() && chars[*pos] == ' ' {
        *pos += 1;
    }
    match chars.get(*pos) {
        Some('{') => {
            *pos += 1;
            convert(chars, pos, true)
        }
        Some('\\') => {
            *pos += 1;
            command(chars, pos)
        }
        Some(&c) => {
            *pos += 1;
            if c == '-' { "−".into() } else { c.to_string() }
        }
        None => String::new(),
    }
}

/// Raw text of a brace group, for `\text{..}` where spacing matters.
fn raw_group(chars: &[char], pos: &mut usize) -> String {
    while *pos < chars.len() && chars[*pos] == ' ' {
        *pos += 1;
    }
    if chars.get(*pos) != Some(&'{') {
        return argument(chars, pos);
    }
    *pos += 1;
    let mut depth = 1;
    let mut out = String::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        *pos += 1;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

fn optional_arg(chars: &[char], pos: &mut usize) -> Option<String> {
    if chars.get(*pos) != Some(&'[') {
        return None;
    }
    let end = chars[*pos..].iter().position(|&c| c == ']')? + *pos;
    let inner: String = chars[*pos + 1..end].iter().collect();
    *pos = end + 1;
    Some(to_unicode(&inner))
}

fn command(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_alphabetic() {
        *pos += 1;
    }
    if *pos == start {
        // Control symbol: `\{`, `\,`, `\\` ...
        let Some(&c) = chars.get(*pos) else {
            return String::new();
        };
        *pos += 1;
        return match c {
            ',' | ';' | ':' | ' ' | '\\' => " ".into(),
            '!' => String::new(),
            '|' => "‖".into(),
            _ => c.to_string(),
        };
    }
    let name: String = chars[start..*pos].iter().collect();

    match name.as_str() {
        "left" | "right" | "big" | "Big" | "bigg" | "Bigg" | "bigl" | "bigr" | "Bigl" | "Bigr" => {
            while *pos < chars.len() && chars[*pos] == ' ' {
                *pos += 1;
            }
            if chars.get(*pos) == Some(&'.') {
                *pos += 1;
            }
            String::new()
        }
        "frac" | "dfrac" | "tfrac" | "cfrac" => {
            let num = argument(chars, pos);
            let den = argument(chars, pos);
            format!("{}/{}", wrap(&num), wrap(&den))
        }
        "binom" | "dbinom" => {
            let n = argument(chars, pos);
            let k = argument(chars, pos);
            format!("C({n}, {k})")
        }
        "sqrt" => {
            let index = optional_arg(chars, pos);
            let radicand = argument(chars, pos);
            let root = match index.as_deref() {
                Some("3") => "∛".to_string(),
                Some("4") => "∜".to_string(),
                Some(n) => format!("{}√", script(n, true)),
                None => "√".to_string(),
            };
            format!("{root}{}", wrap(&radicand))
        }
        "quad" | "qquad" | "enspace" | "thinspace" => " ".into(),
        "mathbb" => {
            let arg = argument(chars, pos);
            arg.chars().map(|c| blackboard(c).unwrap_or(c)).collect()
        }
        "text" | "textrm" | "mbox" | "hbox" | "operatorname" => raw_group(chars, pos),
        n if TEXT_WRAPPERS.contains(&n) => argument(chars, pos),
        n => {
            if let Some(&(_, mark)) = ACCENTS.iter().find(|(a, _)| *a == n) {
                let mut arg = argument(chars, pos);
                arg.push(mark);
                return arg;
            }
            match SYMBOL_MAP.get(n) {
                Some(sym) if sym.chars().all(|c| c.is_ascii_alphabetic()) => format!(" {sym} "),
                Some(sym) => (*sym).to_string(),
                None => {
                    log::debug!("unicode fallback: dropping unknown command \\{n}");
                    String::new()
                }
            }
        }
    }
}

fn wrap(s: &str) -> String {
    let s = s.trim();
    let simple = s.chars().count() <= 1
        || s.chars().all(|c| c.is_alphanumeric() || c == '.')
        || (s.starts_with('(') && s.ends_with(')'));
    if simple { s.to_string() } else { format!("({s})") }
}

fn script(arg: &str, sup: bool) -> String {
    let arg = arg.trim();
    if sup && (arg == "∘" || arg == "°") {
        return "°".into();
    }
    if sup && (arg == "′" || arg == "'") {
        return "′".into();
    }
    let map = if sup { superscript } else { subscript };
    if !arg.is_empty()
        && let Some(mapped) = arg.chars().map(map).collect::<Option<String>>()
    {
        return mapped;
    }
    let mark = if sup { '^' } else { '_' };
    if arg.chars().count() == 1 {
        format!("{mark}{arg}")
    } else {
        format!("{mark}({arg})")
    }
}
