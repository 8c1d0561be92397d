fn main() {
    softwake_lib::run()
}
