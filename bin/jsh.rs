fn main() {
    jsh::shell_main()
}
