fn main() {
    // Export our own symbols so dladdr can name the frames we walk.
    println!("cargo:rustc-link-arg-bins=-rdynamic");
}
