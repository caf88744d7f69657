use super::*;

#[test]
fn hex_is_fixed_width() {
    assert_eq!(ContentHash::new(0xab).to_hex(), "00000000000000ab");
    assert_eq!(ContentHash::new(0xab).to_string(), "00000000000000ab");
}

#[test]
fn string_hash_is_deterministic() {
    assert_eq!(hash_string("clang++ -std=c++20"), hash_string("clang++ -std=c++20"));
    assert_ne!(hash_string("-O0"), hash_string("-O2"));
}

#[test]
fn string_list_hash_respects_boundaries() {
    assert_ne!(hash_strings(["ab", "c"]), hash_strings(["a", "bc"]));
    assert_ne!(hash_strings(["a"]), hash_strings(["a", ""]));
    assert_eq!(hash_strings(Vec::<String>::new()), hash_strings(Vec::<&str>::new()));
}

#[test]
fn combine_is_order_sensitive() {
    let a = ContentHash::new(1);
    let b = ContentHash::new(2);
    assert_eq!(combine_hashes(&[a, b]), combine_hashes(&[a, b]));
    assert_ne!(combine_hashes(&[a, b]), combine_hashes(&[b, a]));
}
