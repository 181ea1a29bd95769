fn main() -> anyhow::Result<()> {
    sew::main_inner()
}
