use KiTab::Examples::tabulation_examples::tab_examples;

pub fn main() {
    //
    let task: usize = 0;
    tab_examples(task);
}
