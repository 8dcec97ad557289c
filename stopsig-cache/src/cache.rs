use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::RwLock;
pub use string_cache::DefaultAtom as Atom;

struct Interner {
    ids: HashMap<Atom, usize>,
    atoms: Vec<Atom>,
}

lazy_static! {
    static ref TEXT_INTERNER: RwLock<Interner> = RwLock::new(Interner {
        ids: HashMap::new(),
        atoms: Vec::new(),
    });
}

/// Intern a string and return its stable ID. IDs are assigned in first-seen
/// order and never reused, so they can key render caches across frames.
pub fn intern_text(s: &str) -> usize {
    let atom = Atom::from(s);
    if let Some(&id) = TEXT_INTERNER.read().unwrap().ids.get(&atom) {
        return id;
    }
    let mut interner = TEXT_INTERNER.write().unwrap();
    // another thread may have interned it between the read and write locks
    if let Some(&id) = interner.ids.get(&atom) {
        return id;
    }
    let id = interner.atoms.len();
    interner.atoms.push(atom.clone());
    interner.ids.insert(atom, id);
    id
}

/// Current count of unique interned texts
pub fn text_count() -> usize {
    TEXT_INTERNER.read().unwrap().atoms.len()
}

pub fn get_text(id: usize) -> Option<Atom> {
    TEXT_INTERNER.read().unwrap().atoms.get(id).cloned()
}
