//! Just enough JSON for request bodies and WebSocket commands.
//!
//! Inputs are small flat objects like `{"action":"sub","topic":"temp"}`;
//! nothing here allocates or validates the whole document.

/// Position just past `"key":` (whitespace skipped), if present.
fn value_start(b: &[u8], key: &[u8]) -> Option<usize> {
    let len = b.len();
    let mut i = 0;
    while i < len {
        if b[i] == b'"' {
            let ks = i + 1;
            let ke = ks + key.len();
            if ke < len && &b[ks..ke] == key && b[ke] == b'"' {
                let mut p = ke + 1;
                while p < len && b[p] == b' ' {
                    p += 1;
                }
                if p < len && b[p] == b':' {
                    p += 1;
                    while p < len && b[p] == b' ' {
                        p += 1;
                    }
                    return Some(p);
                }
            }
        }
        i += 1;
    }
    None
}

/// Extract a string value for `key` from simple JSON: `{"key":"value",...}`.
pub fn get_str<'a>(json: &'a str, key: &str) -> Option<&'a str> {
    let b = json.as_bytes();
    let p = value_start(b, key.as_bytes())?;
    if p < b.len() && b[p] == b'"' {
        let vs = p + 1;
        let mut j = vs;
        while j < b.len() && b[j] != b'"' {
            j += 1;
        }
        if j < b.len() {
            return json.get(vs..j);
        }
    }
    None
}

/// Extract the raw text of a nested object for `key`, braces included.
pub fn get_object<'a>(json: &'a str, key: &str) -> Option<&'a str> {
    let b = json.as_bytes();
    let start = value_start(b, key.as_bytes())?;
    if start >= b.len() || b[start] != b'{' {
        return None;
    }
    let mut depth = 0usize;
    let mut in_str = false;
    for (i, &c) in b.iter().enumerate().skip(start) {
        match c {
            b'"' => in_str = !in_str,
            b'{' if !in_str => depth += 1,
            b'}' if !in_str => {
                depth -= 1;
                if depth == 0 {
                    return json.get(start..=i);
                }
            }
            _ => {}
        }
    }
    None
}

/// String-valued members of a flat object, in document order. Non-string
/// values are skipped.
pub fn pairs(obj: &str) -> Pairs<'_> {
    Pairs { src: obj, pos: 0 }
}

pub struct Pairs<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Pairs<'a> {
    fn quoted(&mut self) -> Option<&'a str> {
        let b = self.src.as_bytes();
        while self.pos < b.len() && b[self.pos] != b'"' {
            self.pos += 1;
        }
        let start = self.pos + 1;
        let mut end = start;
        while end < b.len() && b[end] != b'"' {
            end += 1;
        }
        if end >= b.len() {
            self.pos = b.len();
            return None;
        }
        self.pos = end + 1;
        self.src.get(start..end)
    }
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = self.quoted()?;
            let b = self.src.as_bytes();
            while self.pos < b.len() && matches!(b[self.pos], b' ' | b':') {
                self.pos += 1;
            }
            if self.pos < b.len() && b[self.pos] == b'"' {
                let value = self.quoted()?;
                return Some((key, value));
            }
            // Number, bool or nested value: skip to the next member.
            while self.pos < b.len() && b[self.pos] != b',' {
                self.pos += 1;
            }
        }
    }
}
