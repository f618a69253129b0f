use std::{env, fs, sync::Once};

static START: Once = Once::new();

/// Set cwd to the tests directory to pick up the fixture stackcat.conf
pub fn setup() {
    START.call_once(|| {
        let pwd = env::current_dir().unwrap();
        let pth = fs::canonicalize(pwd.join("tests")).unwrap();
        env::set_var("STACKCAT_DIR", pth.clone());
        println!("Initializing tests - using testdir {}", pth.display());
        stackcat::init().unwrap();
    });
}
