//! Server-rendered HTML pages.

use axum::response::Html;
use bookshelf_core::Book;

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> Html<String> {
    let title = escape(title);
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n<p><a href=\"/\">Home</a> <a href=\"/books/\">Books</a></p>\n</body>\n</html>\n"
    ))
}

fn book_table<'a>(books: impl IntoIterator<Item = &'a Book>) -> String {
    let mut table = String::from(
        "<table>\n<tr><th>Id</th><th>Name</th><th>Author</th><th>Year</th></tr>\n",
    );
    for book in books {
        table.push_str(&format!(
            "<tr><td><a href=\"/books/{id}/\">{id}</a></td><td>{name}</td><td>{author}</td><td>{year}</td></tr>\n",
            id = book.id,
            name = escape(&book.name),
            author = escape(&book.author),
            year = book.year,
        ));
    }
    table.push_str("</table>");
    table
}

pub fn home() -> Html<String> {
    layout(
        "Home",
        "<ul>\n\
         <li><a href=\"/books/\">Books</a></li>\n\
         <li>Create: <code>/books/create/?Name=&amp;Author=&amp;Year=</code></li>\n\
         <li>Update: <code>/books/update/{Id}?Name=&amp;Author=&amp;Year=</code></li>\n\
         <li>Delete: <code>/books/delete/{Id}</code></li>\n\
         </ul>\n\
         <form method=\"post\" action=\"/books/create/\">\n\
         <input name=\"Name\" placeholder=\"Name\">\n\
         <input name=\"Author\" placeholder=\"Author\">\n\
         <input name=\"Year\" placeholder=\"Year\">\n\
         <button type=\"submit\">Create</button>\n\
         </form>",
    )
}

pub fn book_list(books: &[Book]) -> Html<String> {
    layout("Books", &book_table(books))
}

pub fn book_info(book: &Book) -> Html<String> {
    layout("Book info", &book_table([book]))
}

pub fn book_created(book: &Book) -> Html<String> {
    layout("Book Created", &book_table([book]))
}

pub fn book_updated(replaced: usize) -> Html<String> {
    layout("Book Updated", &format!("<p>{replaced} record(s) updated.</p>"))
}

pub fn book_deleted(book: &Book) -> Html<String> {
    layout("Book Deleted", &book_table([book]))
}

pub fn book_not_found() -> Html<String> {
    layout("Book not found", "")
}

pub fn error(title: &str, detail: &str) -> Html<String> {
    layout(title, &format!("<p>{}</p>", escape(detail)))
}

#[cfg(test)]
mod tests {
    use bookshelf_core::BookId;

    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape("plain text"), "plain text");
    }

    #[test]
    fn book_list_escapes_user_text() {
        let books = vec![Book {
            id: BookId(4),
            name: "<script>".to_string(),
            author: "A & B".to_string(),
            year: 1999,
        }];
        let Html(body) = book_list(&books);
        assert!(body.contains("<td>&lt;script&gt;</td>"));
        assert!(body.contains("<td>A &amp; B</td>"));
        assert!(body.contains("<a href=\"/books/4/\">4</a>"));
        assert!(!body.contains("<script>"));
    }
}
